//! WebSocket message types for the ElevenLabs Conversational AI API.
//!
//! Incoming messages are tagged by a `type` field; [`ConvaiMessage::parse`]
//! peeks at the tag first and falls back to `Unknown` for forward
//! compatibility. Outgoing messages are plain serializable structs.

use serde::{Deserialize, Serialize};

// =============================================================================
// Outgoing Messages (Client to Server)
// =============================================================================

/// Sent immediately after connecting to begin the conversation.
#[derive(Debug, Serialize)]
pub struct ConversationInitiation {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for ConversationInitiation {
    fn default() -> Self {
        Self {
            message_type: "conversation_initiation_client_data",
        }
    }
}

/// One chunk of caller audio, base64-encoded in the agent's input format.
#[derive(Debug, Serialize)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

/// Reply to a server `ping`.
#[derive(Debug, Serialize)]
pub struct Pong {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub event_id: u64,
}

impl Pong {
    pub fn new(event_id: u64) -> Self {
        Self {
            message_type: "pong",
            event_id,
        }
    }
}

// =============================================================================
// Incoming Messages (Server to Client)
// =============================================================================

/// Session confirmation carrying the negotiated audio formats.
#[derive(Debug, Deserialize)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    pub agent_output_audio_format: String,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

/// Agent speech audio, base64-encoded in the agent's output format.
#[derive(Debug, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
    pub event_id: u64,
}

/// Finalized text the agent spoke.
#[derive(Debug, Deserialize)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

/// Finalized transcript of what the caller said.
#[derive(Debug, Deserialize)]
pub struct UserTranscriptEvent {
    pub user_transcript: String,
}

/// The caller barged in; buffered agent audio should be discarded.
#[derive(Debug, Deserialize)]
pub struct InterruptionEvent {
    pub event_id: u64,
}

/// Keepalive probe; must be answered with a [`Pong`] echoing the event id.
#[derive(Debug, Deserialize)]
pub struct PingEvent {
    pub event_id: u64,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

// =============================================================================
// Message Enum and Parsing
// =============================================================================

/// All ConvAI messages the bridge reacts to.
#[derive(Debug)]
pub enum ConvaiMessage {
    InitiationMetadata(InitiationMetadata),
    Audio(AudioEvent),
    AgentResponse(AgentResponseEvent),
    UserTranscript(UserTranscriptEvent),
    Interruption(InterruptionEvent),
    Ping(PingEvent),
    /// Unrecognized message type, kept raw for logging.
    Unknown(String),
}

impl ConvaiMessage {
    /// Parse a WebSocket text frame into the appropriate message type.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct TypePeek {
            #[serde(rename = "type")]
            message_type: String,
        }

        // Events arrive wrapped in a `<name>_event` object next to the tag.
        #[derive(Deserialize)]
        struct Envelope<T> {
            #[serde(
                alias = "conversation_initiation_metadata_event",
                alias = "audio_event",
                alias = "agent_response_event",
                alias = "user_transcription_event",
                alias = "interruption_event",
                alias = "ping_event"
            )]
            event: T,
        }

        fn unwrap_event<T: serde::de::DeserializeOwned>(
            text: &str,
        ) -> Result<T, serde_json::Error> {
            serde_json::from_str::<Envelope<T>>(text).map(|e| e.event)
        }

        let peek: TypePeek = serde_json::from_str(text)?;

        match peek.message_type.as_str() {
            "conversation_initiation_metadata" => {
                Ok(ConvaiMessage::InitiationMetadata(unwrap_event(text)?))
            }
            "audio" => Ok(ConvaiMessage::Audio(unwrap_event(text)?)),
            "agent_response" => Ok(ConvaiMessage::AgentResponse(unwrap_event(text)?)),
            "user_transcript" => Ok(ConvaiMessage::UserTranscript(unwrap_event(text)?)),
            "interruption" => Ok(ConvaiMessage::Interruption(unwrap_event(text)?)),
            "ping" => Ok(ConvaiMessage::Ping(unwrap_event(text)?)),
            _ => Ok(ConvaiMessage::Unknown(text.to_string())),
        }
    }
}
