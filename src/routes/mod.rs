pub mod webhooks;
pub mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the full application router: health probe, webhook endpoints and
/// the media stream WebSocket.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(webhooks::create_webhook_router())
        .merge(ws::create_ws_router())
}

async fn health_check() -> &'static str {
    "ok"
}
