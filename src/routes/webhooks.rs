use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{inbound_call, postcall};
use crate::state::AppState;

/// Create the webhook router for the two inbound HTTP surfaces.
///
/// These routes are called by external services (Twilio and the agent
/// platform) and use their own authentication mechanisms; the post-call
/// route verifies a signed payload before acting on it.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/twilio/inbound-call",
            post(inbound_call::inbound_call_handler),
        )
        .route(
            "/webhooks/post-call",
            post(postcall::postcall_webhook_handler),
        )
        .layer(TraceLayer::new_for_http())
}
