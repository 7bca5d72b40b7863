//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `inbound_call` - Twilio inbound call webhook answered with TwiML
//! - `media_stream` - Twilio Media Streams WebSocket bridge
//! - `postcall` - Signed post-call analysis webhook and ticketing kickoff

pub mod inbound_call;
pub mod media_stream;
pub mod postcall;

// Re-export commonly used handlers for convenient access
pub use inbound_call::inbound_call_handler;
pub use media_stream::media_stream_handler;
pub use postcall::postcall_webhook_handler;
