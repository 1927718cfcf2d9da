//! Router configuration for the HTTP surface.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{get_chat_messages, AppState};
use super::middleware::{create_cors_layer, jwt_auth};
use super::ws::chat_ws_handler;

/// Create the main router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api_routes = Router::new().route("/chats/:chat_id/messages", get(get_chat_messages));

    let jwt = Arc::clone(&app_state.jwt);

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(chat_ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let jwt = Arc::clone(&jwt);
                    jwt_auth(jwt, req, next)
                })),
        )
        .with_state(app_state)
        .merge(create_health_router())
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
