//! VAPID application server key handling (RFC 8292).
//!
//! The authority hands out its public key as base64url text. The raw push
//! subscribe call needs the binary form: the 65-byte uncompressed SEC1 P-256
//! point (`0x04 || x || y`).

use anyhow::{Context, Result};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use p256::PublicKey;

/// Decode and validate a base64url VAPID public key.
///
/// Accepts padded and unpadded input and tolerates surrounding whitespace.
/// Rejects anything that is not a valid uncompressed P-256 point.
pub fn decode_application_server_key(key_b64: &str) -> Result<Vec<u8>> {
    let trimmed = key_b64.trim();
    let bytes = if trimmed.ends_with('=') {
        URL_SAFE.decode(trimmed)
    } else {
        URL_SAFE_NO_PAD.decode(trimmed)
    }
    .context("Invalid base64url for VAPID public key")?;

    anyhow::ensure!(
        bytes.len() == 65 && bytes[0] == 0x04,
        "VAPID public key must be 65-byte uncompressed P-256 point, got {} bytes",
        bytes.len()
    );
    PublicKey::from_sec1_bytes(&bytes).context("VAPID public key is not on the P-256 curve")?;

    Ok(bytes)
}
