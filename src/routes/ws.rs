use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router.
///
/// The media stream endpoint carries no request authentication: Twilio only
/// learns the URL from the TwiML this server itself returns, and the bridge
/// holds no state until a valid `start` frame arrives. Deployments that need
/// more should put the endpoint behind a reverse proxy.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream::media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
