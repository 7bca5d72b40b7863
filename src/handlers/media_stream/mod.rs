//! Twilio Media Streams bridge: wire messages, per-call lifecycle, and the
//! WebSocket relay handler.

pub mod handler;
pub mod messages;
pub mod session;

pub use handler::media_stream_handler;
pub use session::{CallSession, LifecycleState};
