//! ElevenLabs Conversational AI session layer.

pub mod client;
pub mod messages;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use client::{ConvaiConfig, ConvaiSession};

use crate::core::audio::CodecError;

/// Errors from the conversation session layer.
#[derive(Debug, Error)]
pub enum ConvaiError {
    /// Fetching the authenticated WebSocket URL failed.
    #[error("failed to fetch signed conversation URL: {0}")]
    SignedUrl(String),

    /// WebSocket connect or session handshake failed.
    #[error("failed to start ConvAI session: {0}")]
    ConnectionFailed(String),

    /// The agent negotiated an audio format the bridge cannot relay.
    #[error(transparent)]
    UnsupportedFormat(#[from] CodecError),

    /// The session has already terminated.
    #[error("ConvAI session is not active")]
    NotActive,
}

/// Observable events emitted by a live conversation session.
#[derive(Debug)]
pub enum ConvaiEvent {
    /// Agent speech, base64-encoded in the agent's output format.
    Audio { payload_b64: String, event_id: u64 },
    /// Finalized text the agent spoke.
    AgentResponse(String),
    /// Finalized transcript of the caller's speech.
    UserTranscript(String),
    /// The caller barged in; buffered agent audio must be flushed.
    Interruption { event_id: u64 },
    /// The session terminated, whichever side initiated it.
    Ended,
}

/// Observer for conversation text events.
///
/// Implementations are invoked from a dedicated dispatch task, never from the
/// relay loop itself, so a slow consumer cannot add latency to the audio
/// path. Swap the implementation to route transcripts to telemetry instead
/// of logs.
#[async_trait]
pub trait ConversationObserver: Send + Sync {
    async fn on_agent_response(&self, call_sid: &str, text: &str);
    async fn on_user_transcript(&self, call_sid: &str, text: &str);
}

/// Default observer: structured log lines per utterance.
pub struct LoggingObserver;

#[async_trait]
impl ConversationObserver for LoggingObserver {
    async fn on_agent_response(&self, call_sid: &str, text: &str) {
        info!(call_sid = %call_sid, "Agent: {text}");
    }

    async fn on_user_transcript(&self, call_sid: &str, text: &str) {
        info!(call_sid = %call_sid, "User: {text}");
    }
}
