//! Per-call lifecycle state.
//!
//! Each WebSocket connection owns exactly one [`CallSession`]. The lifecycle
//! only moves forward: `Idle → Connecting → Active → Closing → Closed`.
//! Teardown can be reached from any state and runs its side effects exactly
//! once, whichever side hangs up first.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::core::convai::{ConvaiError, ConvaiSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Socket open, stream metadata not yet received.
    Idle,
    /// Stream metadata received, agent session being established.
    Connecting,
    /// Duplex relay running.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

pub struct CallSession {
    call_sid: Option<String>,
    stream_sid: Option<String>,
    state: LifecycleState,
    convai: Option<ConvaiSession>,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            call_sid: None,
            stream_sid: None,
            state: LifecycleState::Idle,
            convai: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn call_sid(&self) -> &str {
        self.call_sid.as_deref().unwrap_or("unknown")
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn convai(&self) -> Option<&ConvaiSession> {
        self.convai.as_ref()
    }

    /// Record the call identity from the stream-start frame and move to
    /// `Connecting`. Rejected outside `Idle`; Twilio sends `start` once.
    pub fn begin_connect(&mut self, call_sid: String, stream_sid: String) -> bool {
        if self.state != LifecycleState::Idle {
            warn!(
                call_sid = %call_sid,
                state = ?self.state,
                "Ignoring duplicate stream start"
            );
            return false;
        }
        self.call_sid = Some(call_sid);
        self.stream_sid = Some(stream_sid);
        self.state = LifecycleState::Connecting;
        true
    }

    /// Attach the established agent session and move to `Active`.
    pub fn activate(&mut self, convai: ConvaiSession) {
        debug_assert_eq!(self.state, LifecycleState::Connecting);
        self.convai = Some(convai);
        self.state = LifecycleState::Active;
    }

    /// Forward one chunk of caller audio to the agent. Frames that arrive
    /// outside `Active` are dropped.
    pub async fn send_caller_audio(&self, chunk: Bytes) -> Result<(), ConvaiError> {
        if self.state != LifecycleState::Active {
            return Err(ConvaiError::NotActive);
        }
        match &self.convai {
            Some(convai) => convai.send_audio(chunk).await,
            None => Err(ConvaiError::NotActive),
        }
    }

    /// Tear the call down: end the agent session (bounded by `wait`) and move
    /// to `Closed`. Safe to call from any state and from both hangup paths;
    /// only the first call does work.
    pub async fn teardown(&mut self, wait: Duration) {
        if matches!(self.state, LifecycleState::Closing | LifecycleState::Closed) {
            debug!(call_sid = %self.call_sid(), "Teardown already handled");
            return;
        }
        self.state = LifecycleState::Closing;

        if let Some(mut convai) = self.convai.take() {
            info!(
                call_sid = %self.call_sid(),
                conversation_id = %convai.conversation_id(),
                "Ending agent session"
            );
            convai.end(wait).await;
        }

        self.state = LifecycleState::Closed;
        info!(call_sid = %self.call_sid(), "Call session closed");
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}
