//! HTTP router construction.
//!
//! Assembles routes, CORS, static assets, and the OpenAPI docs into a
//! single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        .route("/health", get(api::health))
        .route("/api/chats", get(api::chats_list).post(api::chats_create))
        .route(
            "/api/chats/{id}",
            get(api::chats_get).delete(api::chats_delete),
        )
        .route("/api/chats/{id}/messages", post(api::chat_message))
        .route("/api/chats/{id}/subscribe", get(api::chat_subscribe))
        .route("/api/chats/{id}/files", post(api::chat_upload))
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "invalid CORS_ORIGIN, falling back to permissive");
            CorsLayer::permissive()
        }
    }
}
