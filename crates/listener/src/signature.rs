//! Webhook signature verification (spec §4.5 / §6).
//!
//! The header carries `<algorithm>=<hexdigest>` computed over the exact
//! request body bytes under the configured shared secret. We only support
//! `sha256`, HMAC-keyed — anything else, or a missing/malformed header, is
//! a verification failure, never a crash.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SUPPORTED_ALGORITHM: &str = "sha256";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header")]
    Malformed,

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature does not match")]
    Mismatch,
}

/// Verifies `header_value` (`Signature: sha256=<hex>`) against `body` under
/// `secret`. Comparison is constant-time over the decoded digest bytes.
pub fn verify(secret: &str, header_value: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    let header_value = header_value.ok_or(SignatureError::MissingHeader)?;
    let (algorithm, hex_digest) = header_value.split_once('=').ok_or(SignatureError::Malformed)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let provided = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.len() != provided.len() || expected.as_slice().ct_eq(&provided).unwrap_u8() != 1 {
        return Err(SignatureError::Mismatch);
    }
    Ok(())
}
