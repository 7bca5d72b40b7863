//! Post-call webhook signature verification.
//!
//! ElevenLabs signs webhook deliveries with an
//! `ElevenLabs-Signature: t=<unix-seconds>,v0=<hex-hmac>` header. The HMAC is
//! SHA-256 over `"<timestamp>.<raw body>"` keyed with the shared webhook
//! secret. Verification is pure: it reads the already-buffered body bytes and
//! produces no side effects.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Tolerance window for the signed timestamp. A payload exactly this old is
/// still accepted; anything older is treated as a replay.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 30 * 60;

/// Why a webhook delivery failed verification.
///
/// The HTTP boundary maps every variant to the same response status so the
/// failure reason is visible in logs but never to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// No signature header was present on the request.
    #[error("missing signature header")]
    MissingHeader,

    /// The signed timestamp is older than the tolerance window.
    #[error("signature timestamp is older than {TIMESTAMP_TOLERANCE_SECS}s")]
    StaleTimestamp,

    /// The recomputed HMAC does not match the provided digest.
    #[error("signature does not match payload")]
    SignatureMismatch,

    /// The header does not parse as `t=<unix-seconds>,v0=<hex-hmac>`.
    #[error("malformed signature header")]
    Malformed,
}

/// Verify a webhook body against its signature header.
///
/// `header` is the raw `ElevenLabs-Signature` value, `None` when the request
/// carried no such header. `now` is the verification time as unix seconds,
/// passed in explicitly so freshness is testable.
pub fn verify(
    body: &[u8],
    header: Option<&str>,
    secret: &str,
    now: u64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let (timestamp, provided_digest) = parse_header(header)?;

    // Boundary-inclusive freshness check: a timestamp of exactly
    // `now - tolerance` is still fresh.
    if timestamp < now.saturating_sub(TIMESTAMP_TOLERANCE_SECS) {
        return Err(SignatureError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if bool::from(expected.as_slice().ct_eq(&provided_digest)) {
        Ok(())
    } else {
        Err(SignatureError::SignatureMismatch)
    }
}

/// Parse `t=<unix-seconds>,v0=<hex-hmac>` into its two fields.
fn parse_header(header: &str) -> Result<(u64, Vec<u8>), SignatureError> {
    let mut fields = header.split(',');

    let timestamp = fields
        .next()
        .and_then(|f| f.trim().strip_prefix("t="))
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or(SignatureError::Malformed)?;

    let digest = fields
        .next()
        .and_then(|f| f.trim().strip_prefix("v0="))
        .and_then(|d| hex::decode(d).ok())
        .ok_or(SignatureError::Malformed)?;

    if digest.is_empty() {
        return Err(SignatureError::Malformed);
    }

    Ok((timestamp, digest))
}
