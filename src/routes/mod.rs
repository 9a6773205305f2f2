// src/routes/mod.rs
pub mod chat;

use crate::state::SharedState;
use axum::{
    Router,
    extract::Request,
    http::Method,
    routing::{get, post},
};
use chat::{chat_handler, stream_handler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;
use uuid::Uuid;

pub fn create_router() -> Router<SharedState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        )
    });

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/stream", post(stream_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(trace)
        .layer(cors)
}
