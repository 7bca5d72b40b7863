//! Audio frame codec for the telephony bridge.
//!
//! Twilio media streams carry base64-encoded G.711 μ-law at 8 kHz mono. The
//! conversational agent negotiates its own representation during session
//! initiation: `ulaw_8000` is relayed as-is after base64 handling, `pcm_8000`
//! is converted sample-by-sample. Conversion is deterministic and stateless
//! per frame — no cross-frame dependency, no side effects.

use base64::prelude::*;
use bytes::Bytes;
use thiserror::Error;

/// Sample rate Twilio media streams are fixed at.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8_000;

/// Encoding name Twilio advertises in the stream-start media format.
pub const TELEPHONY_ENCODING: &str = "audio/x-mulaw";

/// Codec failures. `UnsupportedFormat` is raised at stream setup when either
/// side advertises an encoding the bridge cannot relay.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid base64 audio payload: {0}")]
    InvalidPayload(String),
}

/// Audio representation the agent negotiated at session initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAudioFormat {
    /// G.711 μ-law, 8 kHz — same as the wire, relayed without conversion.
    Ulaw8k,
    /// 16-bit little-endian linear PCM, 8 kHz.
    Pcm8k,
}

impl AgentAudioFormat {
    /// Parse the format string from the ConvAI initiation metadata.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        match s {
            "ulaw_8000" => Ok(Self::Ulaw8k),
            "pcm_8000" => Ok(Self::Pcm8k),
            other => Err(CodecError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Validate the media format advertised in a Twilio stream-start message.
pub fn ensure_stream_format(encoding: &str, sample_rate: u32) -> Result<(), CodecError> {
    if encoding != TELEPHONY_ENCODING || sample_rate != TELEPHONY_SAMPLE_RATE {
        return Err(CodecError::UnsupportedFormat(format!(
            "{encoding}@{sample_rate}"
        )));
    }
    Ok(())
}

/// Decode an inbound telephony payload into the agent's representation.
pub fn decode_inbound(payload_b64: &str, format: AgentAudioFormat) -> Result<Bytes, CodecError> {
    let mulaw = BASE64_STANDARD
        .decode(payload_b64)
        .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;

    match format {
        AgentAudioFormat::Ulaw8k => Ok(Bytes::from(mulaw)),
        AgentAudioFormat::Pcm8k => {
            let mut pcm = Vec::with_capacity(mulaw.len() * 2);
            for byte in mulaw {
                pcm.extend_from_slice(&mulaw_to_linear(byte).to_le_bytes());
            }
            Ok(Bytes::from(pcm))
        }
    }
}

/// Encode agent audio into a base64 payload for the telephony wire.
pub fn encode_outbound(agent_audio: &[u8], format: AgentAudioFormat) -> String {
    match format {
        AgentAudioFormat::Ulaw8k => BASE64_STANDARD.encode(agent_audio),
        AgentAudioFormat::Pcm8k => {
            let mut mulaw = Vec::with_capacity(agent_audio.len() / 2);
            for sample in agent_audio.chunks_exact(2) {
                let value = i16::from_le_bytes([sample[0], sample[1]]);
                mulaw.push(linear_to_mulaw(value));
            }
            BASE64_STANDARD.encode(&mulaw)
        }
    }
}

/// Re-encode an agent audio payload (base64 in the agent's format) into the
/// base64 μ-law payload the telephony wire expects.
pub fn transcode_agent_payload(
    payload_b64: &str,
    format: AgentAudioFormat,
) -> Result<String, CodecError> {
    let agent_audio = BASE64_STANDARD
        .decode(payload_b64)
        .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
    Ok(encode_outbound(&agent_audio, format))
}

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32_635;

/// G.711 μ-law compression of one 16-bit sample.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
    let magnitude = i32::from(sample).abs().min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// G.711 μ-law expansion of one encoded byte.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let mut magnitude = ((i32::from(mantissa) << 3) + MULAW_BIAS) << exponent;
    magnitude -= MULAW_BIAS;

    if sign != 0 {
        (-magnitude) as i16
    } else {
        magnitude as i16
    }
}
