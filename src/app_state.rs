use crate::config::Config;
use crate::notify_server::NotifyServer;
use crate::store::MongoDB;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub notify_server: Addr<NotifyServer>,
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
}
