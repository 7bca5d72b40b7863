//! Twilio media stream WebSocket handler.
//!
//! Bridges one telephony connection to one agent conversation:
//!
//! 1. Twilio connects and sends `connected` then `start`.
//! 2. The stream format is validated and an agent session is established.
//! 3. `media` frames are relayed caller → agent; agent events are pumped
//!    agent → caller by a dedicated task.
//! 4. Either side hanging up tears the whole call down exactly once.
//!
//! Outbound frames go through a bounded channel with a dedicated sender task.
//! When the caller's downlink cannot keep up, agent audio frames are dropped
//! rather than queued without bound.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{OutboundMessage, TwilioMessage};
use super::session::CallSession;
use crate::{
    core::{
        audio::{self, AgentAudioFormat},
        convai::{ConvaiEvent, ConvaiSession, ConversationObserver},
    },
    state::AppState,
};

/// Bounded capacity of the telephony-bound frame channel. At ~20ms per media
/// frame this buffers a few seconds of agent speech.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Upgrade the HTTP connection for a Twilio media stream.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Media stream connection upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

/// Manage one media stream connection for its whole lifetime.
async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<OutboundMessage>(OUTBOUND_CHANNEL_CAPACITY);

    // Dedicated sender task; the relay loop never touches the sink directly.
    let sender_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outbound frame: {e}");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                warn!("Failed to send frame to Twilio: {e}");
                break;
            }
        }
    });

    let mut call = CallSession::new();
    // Signalled by the event pump when the agent hangs up first.
    let (ended_tx, mut ended_rx) = mpsc::channel::<()>(1);
    let mut event_pump: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let keep_going = handle_twilio_frame(
                            &text,
                            &mut call,
                            &state,
                            &outbound_tx,
                            &ended_tx,
                            &mut event_pump,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(call_sid = %call.call_sid(), "Twilio closed the media stream");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Media streams are text-only; ignore other frames.
                    }
                    Some(Err(e)) => {
                        warn!(call_sid = %call.call_sid(), "Media stream error: {e}");
                        break;
                    }
                    None => {
                        info!(call_sid = %call.call_sid(), "Media stream disconnected");
                        break;
                    }
                }
            }

            _ = ended_rx.recv() => {
                info!(call_sid = %call.call_sid(), "Agent session ended, closing call");
                break;
            }
        }
    }

    call.teardown(state.config.session_end_timeout).await;
    if let Some(pump) = event_pump {
        pump.abort();
    }
    sender_task.abort();

    info!(call_sid = %call.call_sid(), "Media stream connection terminated");
}

/// React to one Twilio frame. Returns `false` when the call should close.
async fn handle_twilio_frame(
    text: &str,
    call: &mut CallSession,
    state: &Arc<AppState>,
    outbound_tx: &mpsc::Sender<OutboundMessage>,
    ended_tx: &mpsc::Sender<()>,
    event_pump: &mut Option<JoinHandle<()>>,
) -> bool {
    let message: TwilioMessage = match serde_json::from_str(text) {
        Err(e) => {
            // Malformed frames are skipped, never fatal.
            warn!(call_sid = %call.call_sid(), "Unparseable media stream frame: {e}");
            return true;
        }
        Ok(message) => message,
    };

    match message {
        TwilioMessage::Connected => {
            debug!("Media stream connected");
            true
        }

        TwilioMessage::Start { start } => {
            if let Err(e) = audio::ensure_stream_format(
                &start.media_format.encoding,
                start.media_format.sample_rate,
            ) {
                error!(call_sid = %start.call_sid, "Rejecting stream: {e}");
                return false;
            }

            if !call.begin_connect(start.call_sid, start.stream_sid) {
                return true;
            }

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let convai =
                match ConvaiSession::start(&state.config.convai_config(), &state.http, events_tx)
                    .await
                {
                    Ok(convai) => convai,
                    Err(e) => {
                        error!(call_sid = %call.call_sid(), "Failed to start agent session: {e}");
                        return false;
                    }
                };

            *event_pump = Some(spawn_event_pump(
                events_rx,
                call.call_sid().to_string(),
                call.stream_sid().unwrap_or_default().to_string(),
                convai.agent_format(),
                outbound_tx.clone(),
                state.observer.clone(),
                ended_tx.clone(),
            ));

            call.activate(convai);
            true
        }

        TwilioMessage::Media { media } => {
            let format = match call.convai() {
                Some(convai) => convai.agent_format(),
                None => {
                    // Audio racing ahead of session setup is dropped.
                    debug!("Dropping media frame outside active session");
                    return true;
                }
            };

            match audio::decode_inbound(&media.payload, format) {
                Ok(chunk) => {
                    if let Err(e) = call.send_caller_audio(chunk).await {
                        debug!(call_sid = %call.call_sid(), "Dropping caller audio: {e}");
                    }
                }
                Err(e) => {
                    warn!(call_sid = %call.call_sid(), "Invalid media payload: {e}");
                }
            }
            true
        }

        TwilioMessage::Mark => {
            debug!("Playback mark acknowledged");
            true
        }

        TwilioMessage::Stop => {
            info!(call_sid = %call.call_sid(), "Call ended by Twilio");
            false
        }
    }
}

/// Pump agent events toward the caller and the observer.
///
/// Audio uses `try_send` so a saturated downlink sheds frames instead of
/// backing up into the agent connection; control frames and text events are
/// never shed.
fn spawn_event_pump(
    mut events: mpsc::UnboundedReceiver<ConvaiEvent>,
    call_sid: String,
    stream_sid: String,
    agent_format: AgentAudioFormat,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    observer: Arc<dyn ConversationObserver>,
    ended_tx: mpsc::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConvaiEvent::Audio { payload_b64, .. } => {
                    let payload = match audio::transcode_agent_payload(&payload_b64, agent_format) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(call_sid = %call_sid, "Dropping agent audio: {e}");
                            continue;
                        }
                    };
                    match outbound_tx.try_send(OutboundMessage::media(&stream_sid, payload)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!(call_sid = %call_sid, "Outbound channel full, shedding agent audio");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }

                ConvaiEvent::Interruption { event_id } => {
                    debug!(call_sid = %call_sid, event_id, "Caller interruption, clearing playback");
                    if outbound_tx
                        .send(OutboundMessage::clear(&stream_sid))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }

                ConvaiEvent::AgentResponse(text) => {
                    observer.on_agent_response(&call_sid, &text).await;
                }

                ConvaiEvent::UserTranscript(text) => {
                    observer.on_user_transcript(&call_sid, &text).await;
                }

                ConvaiEvent::Ended => {
                    let _ = ended_tx.try_send(());
                    break;
                }
            }
        }
    })
}
