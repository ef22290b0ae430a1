//! HTTP routes

pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the application router.
///
/// Webhook endpoints are public by design - gateways authenticate through
/// signatures and callback tokens, not sessions.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/webhooks/subscription/midtrans",
            post(webhooks::midtrans_notification),
        )
        .route(
            "/webhooks/subscription/xendit",
            post(webhooks::xendit_callback),
        )
        .route(
            "/webhooks/subscription/generic",
            post(webhooks::generic_callback),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
