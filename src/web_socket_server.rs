use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::warn;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::notify_server::{
    event, Decision, Disconnect, Emit, Join, NotifyServer, ResolveRequest, RoomMessage,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// `{id, from, to}` reference to an assigned task, usernames on both ends.
#[derive(Debug, Deserialize)]
pub struct AssignmentRef {
    pub id: String,
    pub from: String,
    pub to: String,
}

/// Client-to-server events, JSON framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientEvent {
    #[serde(rename = "join")]
    Join(String),
    #[serde(rename = "accept-task")]
    AcceptTask(AssignmentRef),
    #[serde(rename = "reject-task")]
    RejectTask(AssignmentRef),
    #[serde(rename = "task-assign")]
    TaskAssign {
        from: String,
        to: String,
        status: String,
        id: String,
    },
}

pub struct WsSession {
    /// Set once the client sends `join`; used to tear down the room entry.
    username: Option<String>,
    hb: Instant,
    server: Addr<NotifyServer>,
}

impl WsSession {
    pub fn new(server: Addr<NotifyServer>) -> Self {
        WsSession {
            username: None,
            hb: Instant::now(),
            server,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn dispatch(&mut self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            ClientEvent::Join(username) => {
                self.username = Some(username.clone());
                self.server.do_send(Join {
                    username,
                    addr: ctx.address().recipient(),
                });
            }
            ClientEvent::AcceptTask(info) => {
                self.server.do_send(ResolveRequest {
                    decision: Decision::Accept,
                    task_id: info.id,
                    from: info.from,
                    to: info.to,
                    requester: ctx.address().recipient(),
                });
            }
            ClientEvent::RejectTask(info) => {
                self.server.do_send(ResolveRequest {
                    decision: Decision::Reject,
                    task_id: info.id,
                    from: info.from,
                    to: info.to,
                    requester: ctx.address().recipient(),
                });
            }
            ClientEvent::TaskAssign { from, to, status, id } => {
                // Pure relay into the receiver's room.
                let payload = json!({ "from": from, "to": &to, "status": status, "id": id });
                self.server.do_send(Emit {
                    to,
                    event: event::TASK_ASSIGN,
                    payload,
                });
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        if let Some(username) = self.username.take() {
            self.server.do_send(Disconnect {
                username,
                addr: ctx.address().recipient(),
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => self.dispatch(event, ctx),
                Err(e) => {
                    warn!("Failed to parse client event: {}", e);
                    let msg = json!({ "event": event::ERROR, "data": { "message": "malformed event" } });
                    ctx.text(msg.to_string());
                }
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<RoomMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: RoomMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let outgoing = json!({ "event": msg.event, "data": msg.payload });
        ctx.text(outgoing.to_string());
    }
}

/// GET /ws — upgrades the connection and hands it a session actor.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    ws::start(WsSession::new(data.notify_server.clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_tagged_json() {
        let raw = r#"{"event":"accept-task","data":{"id":"t1","from":"alice","to":"bob"}}"#;
        match serde_json::from_str::<ClientEvent>(raw).unwrap() {
            ClientEvent::AcceptTask(info) => {
                assert_eq!(info.id, "t1");
                assert_eq!(info.from, "alice");
                assert_eq!(info.to, "bob");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let raw = r#"{"event":"join","data":"alice"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(raw).unwrap(),
            ClientEvent::Join(u) if u == "alice"
        ));
    }

    #[test]
    fn unknown_events_are_rejected() {
        let raw = r#"{"event":"drop-tables","data":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
