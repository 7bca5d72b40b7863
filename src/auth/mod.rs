pub mod webhook_signature;

pub use webhook_signature::{SignatureError, TIMESTAMP_TOLERANCE_SECS, verify};
