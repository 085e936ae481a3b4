//! Content fingerprints used for signal dedupe and action change detection.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::error::ActionError;

/// Lowercase hex encoding.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

/// SHA-256 of `bytes` as lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

/// SHA-256 of the JSON serialization of `value`.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String, ActionError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}
