//! Twilio Media Streams wire messages.
//!
//! Frames are JSON text tagged by an `event` field. Envelope-level keys are
//! lowercase; nested object keys are camelCase. Numeric-looking fields such
//! as `timestamp` and `chunk` arrive as strings and are kept as such.

use serde::{Deserialize, Serialize};

/// Messages Twilio sends over a media stream connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioMessage {
    /// First frame after the WebSocket opens.
    Connected,
    /// Stream metadata; carries the call identity and the media format.
    Start { start: StartMeta },
    /// One ~20ms chunk of caller audio.
    Media { media: MediaPayload },
    /// Playback checkpoint acknowledgement.
    Mark,
    /// The call ended; no further frames follow.
    Stop,
}

#[derive(Debug, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "mediaFormat")]
    pub media_format: MediaFormat,
}

#[derive(Debug, Deserialize)]
pub struct MediaFormat {
    pub encoding: String,
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded μ-law audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    /// Stream-relative milliseconds, as a decimal string.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Messages the bridge sends back to Twilio.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Agent audio to play to the caller.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Flush Twilio's buffered audio after a caller interruption.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Serialize)]
pub struct OutboundMedia {
    /// Base64-encoded μ-law audio.
    pub payload: String,
}

impl OutboundMessage {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_frame() {
        let text = r#"{"event": "connected", "protocol": "Call", "version": "1.0.0"}"#;
        assert!(matches!(
            serde_json::from_str::<TwilioMessage>(text).unwrap(),
            TwilioMessage::Connected
        ));
    }

    #[test]
    fn parses_start_frame() {
        let text = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC0000",
                "streamSid": "MZ1234",
                "callSid": "CA5678",
                "tracks": ["inbound"],
                "mediaFormat": {
                    "encoding": "audio/x-mulaw",
                    "sampleRate": 8000,
                    "channels": 1
                }
            },
            "streamSid": "MZ1234"
        }"#;

        match serde_json::from_str::<TwilioMessage>(text).unwrap() {
            TwilioMessage::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1234");
                assert_eq!(start.call_sid, "CA5678");
                assert_eq!(start.media_format.encoding, "audio/x-mulaw");
                assert_eq!(start.media_format.sample_rate, 8000);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parses_media_frame() {
        let text = r#"{
            "event": "media",
            "sequenceNumber": "4",
            "media": {
                "track": "inbound",
                "chunk": "2",
                "timestamp": "5",
                "payload": "fn9+fg=="
            },
            "streamSid": "MZ1234"
        }"#;

        match serde_json::from_str::<TwilioMessage>(text).unwrap() {
            TwilioMessage::Media { media } => {
                assert_eq!(media.payload, "fn9+fg==");
                assert_eq!(media.track.as_deref(), Some("inbound"));
                assert_eq!(media.timestamp.as_deref(), Some("5"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parses_stop_and_mark_frames() {
        let stop = r#"{"event": "stop", "sequenceNumber": "9", "stop": {"callSid": "CA5678"}, "streamSid": "MZ1234"}"#;
        assert!(matches!(
            serde_json::from_str::<TwilioMessage>(stop).unwrap(),
            TwilioMessage::Stop
        ));

        let mark = r#"{"event": "mark", "mark": {"name": "checkpoint-1"}, "streamSid": "MZ1234"}"#;
        assert!(matches!(
            serde_json::from_str::<TwilioMessage>(mark).unwrap(),
            TwilioMessage::Mark
        ));
    }

    #[test]
    fn outbound_media_serializes_with_camel_case_sid() {
        let json =
            serde_json::to_string(&OutboundMessage::media("MZ1234", "AAAA".to_string())).unwrap();
        assert_eq!(
            json,
            r#"{"event":"media","streamSid":"MZ1234","media":{"payload":"AAAA"}}"#
        );
    }

    #[test]
    fn outbound_clear_serializes() {
        let json = serde_json::to_string(&OutboundMessage::clear("MZ1234")).unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":"MZ1234"}"#);
    }
}
