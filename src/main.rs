// src/main.rs

mod app_state;
mod assign_task;
mod auth;
mod config;
mod error;
mod models;
mod notify_server;
mod store;
mod task;
mod web_socket_server;
mod workflow;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::info;

use crate::app_state::AppState;
use crate::assign_task::{
    create_assignment, delete_assignment, edit_assignment, list_assignments,
};
use crate::auth::{login, logout, refresh, signup, validate_token};
use crate::task::{create_task, delete_task, list_active_tasks, list_all_tasks, update_task};
use crate::web_socket_server::ws_index;

/// Token verification keyed on the one access secret loaded at startup.
#[derive(Debug, Clone)]
pub struct Authentication {
    access_secret: String,
}

impl Authentication {
    pub fn new(access_secret: &str) -> Self {
        Authentication {
            access_secret: access_secret.to_string(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            access_secret: self.access_secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    access_secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present.
        // A verified token stashes the user id in request extensions; the
        // handlers treat a missing id as unauthenticated.
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match validate_token(&token, &self.access_secret) {
                        Ok(claims) => {
                            req.extensions_mut().insert(claims.sub);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(store::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    let notify_server =
        notify_server::NotifyServer::new(mongodb.clone(), config.store_timeout).start();

    let frontend_origin = config.frontend_origin.clone();
    info!("Server running at http://0.0.0.0:8080");
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication::new(&config.access_secret))
            .app_data(web::Data::new(AppState {
                notify_server: notify_server.clone(),
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/user")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout)),
            )
            // PERSONAL TASKS
            .service(
                web::scope("/task")
                    .route("/create", web::post().to(create_task))
                    .route("/all", web::get().to(list_all_tasks))
                    .route("/update/{id}", web::patch().to(update_task))
                    .route("/delete/{id}", web::delete().to(delete_task))
                    .route("", web::get().to(list_active_tasks)),
            )
            // ASSIGNED TASKS
            .service(
                web::scope("/assignTask")
                    .route("/edit/{id}", web::put().to(edit_assignment))
                    .route("/delete/{id}", web::delete().to(delete_assignment))
                    .route("", web::get().to(list_assignments))
                    .route("", web::post().to(create_assignment)),
            )
            // WEBSOCKET route for real-time
            .service(web::resource("/ws").route(web::get().to(ws_index)))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
