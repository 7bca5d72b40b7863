//! Inbound call webhook.
//!
//! Twilio posts here when a call comes in; the reply is a TwiML document that
//! connects the call's audio to the media stream WebSocket endpoint.

use axum::{
    Form,
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InboundCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

pub async fn inbound_call_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<InboundCallForm>,
) -> impl IntoResponse {
    info!(
        call_sid = form.call_sid.as_deref().unwrap_or("unknown"),
        from = form.from.as_deref().unwrap_or("unknown"),
        "Inbound call received"
    );

    let twiml = connect_stream_twiml(&state.config.public_host);
    ([(header::CONTENT_TYPE, "application/xml")], twiml)
}

/// TwiML that hands the call audio to the media stream endpoint.
fn connect_stream_twiml(public_host: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
           <Connect>\
             <Stream url=\"wss://{public_host}/media-stream\" />\
           </Connect>\
         </Response>"
    )
}
