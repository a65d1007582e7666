//! HTTP request handlers

use actix_web::web;

pub mod auth;
pub mod call;
pub mod contacts;
pub mod events;
pub mod info;

/// Register every data-plane route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/login", web::post().to(auth::login))
            .route("/logout", web::get().to(auth::logout))
            .route("/contacts", web::get().to(contacts::contacts))
            .route("/call", web::post().to(call::make_call))
            .route("/call/hangup", web::post().to(call::hangup))
            .route("/call/transfer", web::post().to(call::transfer))
            .route("/events", web::get().to(events::events))
            .route("/info", web::get().to(info::connection_info)),
    )
    .route("/rules", web::get().to(info::rules));
}
