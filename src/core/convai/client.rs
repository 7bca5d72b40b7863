//! ElevenLabs Conversational AI WebSocket session client.
//!
//! One [`ConvaiSession`] owns one duplex conversation with the agent. The
//! implementation uses a channel architecture around a single connection
//! task:
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ send_audio() │────▶│ audio_tx (bounded)│────▶│  Connection Task │
//! └──────────────┘     └───────────────────┘     └────────┬─────────┘
//!                                                         │
//!                      ┌───────────────────┐              │
//!                      │ events (unbounded)│◀─────────────┘
//!                      └───────────────────┘
//! ```
//!
//! Authentication is required: a signed WebSocket URL is fetched over HTTPS
//! with the account API key before connecting, so the agent cannot be reached
//! with the bare agent id alone.

use base64::prelude::*;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::messages::{ConvaiMessage, ConversationInitiation, InitiationMetadata, Pong, UserAudioChunk};
use super::{ConvaiError, ConvaiEvent};
use crate::core::audio::AgentAudioFormat;

/// Bounded capacity of the caller-audio channel. Provides backpressure toward
/// the telephony socket instead of unbounded queueing.
const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// How long to wait for the initiation metadata after connecting.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one conversation session.
#[derive(Debug, Clone)]
pub struct ConvaiConfig {
    pub api_key: String,
    pub agent_id: String,
    /// REST base for the signed-URL fetch, e.g. `https://api.elevenlabs.io`.
    pub api_base: String,
}

#[derive(Debug, serde::Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// A live conversation with the agent.
///
/// The session is exclusively owned by its call; ending it is idempotent
/// because the shutdown sender is consumed on first use.
pub struct ConvaiSession {
    conversation_id: String,
    agent_format: AgentAudioFormat,
    audio_tx: mpsc::Sender<Bytes>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    connection_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ConvaiSession {
    /// Start a conversation: fetch the signed URL, connect, send the
    /// initiation message and wait (bounded) for the session metadata.
    ///
    /// `events` receives every observable conversation event, including the
    /// final [`ConvaiEvent::Ended`] when the connection task exits.
    pub async fn start(
        config: &ConvaiConfig,
        http: &reqwest::Client,
        events: mpsc::UnboundedSender<ConvaiEvent>,
    ) -> Result<Self, ConvaiError> {
        let signed_url = fetch_signed_url(config, http).await?;

        let (ws_stream, _response) = connect_async(&signed_url)
            .await
            .map_err(|e| ConvaiError::ConnectionFailed(e.to_string()))?;

        debug!(agent_id = %config.agent_id, "Connected to ConvAI WebSocket");

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        let init = serde_json::to_string(&ConversationInitiation::default())
            .map_err(|e| ConvaiError::ConnectionFailed(e.to_string()))?;
        ws_sink
            .send(Message::Text(init.into()))
            .await
            .map_err(|e| ConvaiError::ConnectionFailed(e.to_string()))?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<InitiationMetadata>();

        let connection_handle = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);

            loop {
                tokio::select! {
                    // Caller audio toward the agent.
                    Some(chunk) = audio_rx.recv() => {
                        let msg = UserAudioChunk {
                            user_audio_chunk: BASE64_STANDARD.encode(&chunk),
                        };
                        let json = match serde_json::to_string(&msg) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to serialize audio chunk: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            warn!("Failed to send audio to ConvAI: {e}");
                            break;
                        }
                    }

                    // Agent events toward the bridge.
                    message = ws_source.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                handle_text_frame(
                                    &text,
                                    &events,
                                    &mut ready_tx,
                                    &mut ws_sink,
                                )
                                .await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!("ConvAI closed the session: {frame:?}");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Binary/ping/pong frames are not part of the
                                // ConvAI protocol; ignore them.
                            }
                            Some(Err(e)) => {
                                warn!("ConvAI WebSocket error: {e}");
                                break;
                            }
                            None => {
                                info!("ConvAI WebSocket stream ended");
                                break;
                            }
                        }
                    }

                    // Explicit teardown from the lifecycle controller.
                    _ = &mut shutdown_rx => {
                        debug!("Shutdown requested for ConvAI session");
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            // Whoever is supervising the call learns the session is gone,
            // whichever side initiated it.
            let _ = events.send(ConvaiEvent::Ended);
        });

        // Bounded wait for the session-start confirmation.
        let metadata = match timeout(HANDSHAKE_TIMEOUT, ready_rx).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(_)) => {
                return Err(ConvaiError::ConnectionFailed(
                    "connection task exited before session start".to_string(),
                ));
            }
            Err(_) => {
                connection_handle.abort();
                return Err(ConvaiError::ConnectionFailed(
                    "timed out waiting for conversation initiation".to_string(),
                ));
            }
        };

        let agent_format = AgentAudioFormat::parse(&metadata.agent_output_audio_format)?;

        info!(
            conversation_id = %metadata.conversation_id,
            agent_output_format = %metadata.agent_output_audio_format,
            "ConvAI session started"
        );

        Ok(Self {
            conversation_id: metadata.conversation_id,
            agent_format,
            audio_tx,
            shutdown_tx: Some(shutdown_tx),
            connection_handle: Some(connection_handle),
        })
    }

    /// Session id assigned by the agent platform.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Audio representation the agent negotiated for both directions.
    pub fn agent_format(&self) -> AgentAudioFormat {
        self.agent_format
    }

    /// Queue one chunk of caller audio (already in the agent's input format).
    ///
    /// Blocks only while the bounded channel is full, which propagates
    /// backpressure to the telephony read loop.
    pub async fn send_audio(&self, chunk: Bytes) -> Result<(), ConvaiError> {
        self.audio_tx
            .send(chunk)
            .await
            .map_err(|_| ConvaiError::NotActive)
    }

    /// Request session termination. Returns `true` the first time; the
    /// shutdown sender is consumed so termination is requested exactly once.
    pub fn request_end(&mut self) -> bool {
        match self.shutdown_tx.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// End the session and wait for the connection task to finish, bounded by
    /// `wait`. On timeout the task is aborted and a warning logged rather
    /// than stalling the caller.
    pub async fn end(&mut self, wait: Duration) {
        self.request_end();

        if let Some(mut handle) = self.connection_handle.take() {
            match timeout(wait, &mut handle).await {
                Ok(_) => debug!("ConvAI session terminated cleanly"),
                Err(_) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        wait_secs = wait.as_secs(),
                        "Timed out waiting for ConvAI session termination; abandoning task"
                    );
                    handle.abort();
                }
            }
        }
    }

    /// Assemble a session from raw parts. Test seam for lifecycle logic.
    #[doc(hidden)]
    pub fn from_parts(
        conversation_id: String,
        agent_format: AgentAudioFormat,
        audio_tx: mpsc::Sender<Bytes>,
        shutdown_tx: oneshot::Sender<()>,
        connection_handle: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            conversation_id,
            agent_format,
            audio_tx,
            shutdown_tx: Some(shutdown_tx),
            connection_handle: Some(connection_handle),
        }
    }
}

impl Drop for ConvaiSession {
    fn drop(&mut self) {
        // Last-resort cleanup; the lifecycle controller normally ends the
        // session explicitly before the call is discarded.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Dispatch one incoming text frame to the event channel.
async fn handle_text_frame<S>(
    text: &str,
    events: &mpsc::UnboundedSender<ConvaiEvent>,
    ready_tx: &mut Option<oneshot::Sender<InitiationMetadata>>,
    ws_sink: &mut S,
) where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let parsed = match ConvaiMessage::parse(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Failed to parse ConvAI message: {e}");
            return;
        }
    };

    match parsed {
        ConvaiMessage::InitiationMetadata(metadata) => {
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(metadata);
            }
        }
        ConvaiMessage::Audio(audio) => {
            let _ = events.send(ConvaiEvent::Audio {
                payload_b64: audio.audio_base_64,
                event_id: audio.event_id,
            });
        }
        ConvaiMessage::AgentResponse(response) => {
            let _ = events.send(ConvaiEvent::AgentResponse(response.agent_response));
        }
        ConvaiMessage::UserTranscript(transcript) => {
            let _ = events.send(ConvaiEvent::UserTranscript(transcript.user_transcript));
        }
        ConvaiMessage::Interruption(interruption) => {
            let _ = events.send(ConvaiEvent::Interruption {
                event_id: interruption.event_id,
            });
        }
        ConvaiMessage::Ping(ping) => {
            let pong = Pong::new(ping.event_id);
            if let Ok(json) = serde_json::to_string(&pong) {
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    warn!("Failed to answer ConvAI ping: {e}");
                }
            }
        }
        ConvaiMessage::Unknown(raw) => {
            debug!("Ignoring unknown ConvAI message: {raw}");
        }
    }
}

/// Fetch an authenticated WebSocket URL for the agent.
async fn fetch_signed_url(
    config: &ConvaiConfig,
    http: &reqwest::Client,
) -> Result<String, ConvaiError> {
    let url = format!(
        "{}/v1/convai/conversation/get_signed_url?agent_id={}",
        config.api_base, config.agent_id
    );

    let response = http
        .get(&url)
        .header("xi-api-key", &config.api_key)
        .send()
        .await
        .map_err(|e| ConvaiError::SignedUrl(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ConvaiError::SignedUrl(format!(
            "signed-URL endpoint returned {status}: {body}"
        )));
    }

    let parsed: SignedUrlResponse = response
        .json()
        .await
        .map_err(|e| ConvaiError::SignedUrl(e.to_string()))?;

    Ok(parsed.signed_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_end_fires_exactly_once() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = shutdown_rx.await;
        });

        let mut session = ConvaiSession::from_parts(
            "conv_test".to_string(),
            AgentAudioFormat::Ulaw8k,
            audio_tx,
            shutdown_tx,
            handle,
        );

        assert!(session.request_end());
        assert!(!session.request_end());
        assert!(!session.request_end());
    }

    #[tokio::test]
    async fn end_waits_for_task_within_bound() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = shutdown_rx.await;
        });

        let mut session = ConvaiSession::from_parts(
            "conv_test".to_string(),
            AgentAudioFormat::Ulaw8k,
            audio_tx,
            shutdown_tx,
            handle,
        );

        // Completes well within the bound because the task exits on shutdown.
        tokio::time::timeout(Duration::from_secs(1), session.end(Duration::from_secs(5)))
            .await
            .expect("end() should not exceed its own bound");
    }

    #[tokio::test]
    async fn end_abandons_a_hung_task() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        // Task that never observes shutdown.
        let handle = tokio::spawn(async move {
            std::future::pending::<()>().await;
        });

        let mut session = ConvaiSession::from_parts(
            "conv_hung".to_string(),
            AgentAudioFormat::Ulaw8k,
            audio_tx,
            shutdown_tx,
            handle,
        );

        let started = std::time::Instant::now();
        session.end(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn send_audio_fails_after_receiver_drops() {
        let (audio_tx, audio_rx) = mpsc::channel(1);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async {});

        let session = ConvaiSession::from_parts(
            "conv_test".to_string(),
            AgentAudioFormat::Ulaw8k,
            audio_tx,
            shutdown_tx,
            handle,
        );

        drop(audio_rx);
        let err = session.send_audio(Bytes::from_static(b"xx")).await.unwrap_err();
        assert!(matches!(err, ConvaiError::NotActive));
    }
}
