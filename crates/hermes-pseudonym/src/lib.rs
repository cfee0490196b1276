//! # Hermes Pseudonyms - Channel-Keyed Display Names
//!
//! Deterministic per-(identity, channel) display names that are
//! computationally unlinkable across channels.
//!
//! ## Construction
//!
//! A single 256-bit pseudonym key is derived from the identity key via
//! HKDF-SHA256 (empty salt, fixed info [`PSEUDONYM_INFO`]); the channel id
//! then enters as the *message* of an HMAC-SHA256 under that key. The
//! channel must not be moved into the HKDF info: deriving a distinct key per
//! channel is a different construction with different unlinkability
//! properties, and every node must produce byte-identical pseudonyms.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// HKDF context string binding the derived key to this protocol use.
pub const PSEUDONYM_INFO: &[u8] = b"hermes-pseudonym";

/// Bytes of decoded private key material used as HKDF input keying material.
const IKM_LEN: usize = 32;

/// Pseudonym derivation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PseudonymError {
    /// The private key argument was empty.
    #[error("missing_private_key: a non-empty base64 private key is required")]
    MissingPrivateKey,
    /// The channel id argument was empty.
    #[error("missing_channel_id: a non-empty channel id is required")]
    MissingChannelId,
    /// The private key was not valid base64.
    #[error("invalid_base64_private_key: private key is not valid base64")]
    InvalidBase64,
    /// The decoded private key was shorter than 32 bytes.
    #[error("private_key_too_short: private key must decode to at least {IKM_LEN} bytes")]
    KeyTooShort,
    /// The HKDF/HMAC machinery rejected its inputs.
    #[error("derivation_failed: key derivation rejected its inputs")]
    DerivationFailed,
}

/// Derive the deterministic pseudonym for an identity within a channel.
///
/// Returns a 44-character base64 string. Same inputs always produce the
/// same output; different channels produce unrelated outputs for the same
/// identity.
pub fn derive(private_key_b64: &str, channel_id: &str) -> Result<String, PseudonymError> {
    if private_key_b64.is_empty() {
        return Err(PseudonymError::MissingPrivateKey);
    }
    if channel_id.is_empty() {
        return Err(PseudonymError::MissingChannelId);
    }

    let key_bytes = BASE64
        .decode(private_key_b64)
        .map_err(|_| PseudonymError::InvalidBase64)?;
    if key_bytes.len() < IKM_LEN {
        return Err(PseudonymError::KeyTooShort);
    }

    // Empty salt is equivalent to the RFC 5869 zero-filled default.
    let hkdf = Hkdf::<Sha256>::new(None, &key_bytes[..IKM_LEN]);
    let mut pseudonym_key = [0u8; 32];
    hkdf.expand(PSEUDONYM_INFO, &mut pseudonym_key)
        .map_err(|_| PseudonymError::DerivationFailed)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&pseudonym_key)
        .map_err(|_| PseudonymError::DerivationFailed)?;
    mac.update(channel_id.as_bytes());
    let tag = mac.finalize().into_bytes();

    Ok(BASE64.encode(tag))
}

/// First `len` characters of a pseudonym, clamped to its length.
pub fn shorten(pseudonym: &str, len: usize) -> &str {
    match pseudonym.char_indices().nth(len) {
        Some((idx, _)) => &pseudonym[..idx],
        None => pseudonym,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 64 zero bytes, the layout of an Ed25519 keypair encoding.
    fn test_key() -> String {
        BASE64.encode([0u8; 64])
    }

    #[test]
    fn derivation_is_deterministic() {
        let key = test_key();
        let a = derive(&key, "General").unwrap();
        let b = derive(&key, "General").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pseudonym_is_44_base64_chars() {
        let p = derive(&test_key(), "General").unwrap();
        assert_eq!(p.len(), 44);
        assert!(BASE64.decode(&p).is_ok());
    }

    #[test]
    fn channels_are_unlinkable() {
        let key = test_key();
        let a = derive(&key, "ChannelA").unwrap();
        let b = derive(&key, "ChannelB").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn identities_are_distinct_within_a_channel() {
        let other = BASE64.encode([7u8; 64]);
        let a = derive(&test_key(), "General").unwrap();
        let b = derive(&other, "General").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn only_the_first_32_key_bytes_matter() {
        let mut long = [3u8; 64];
        let a = derive(&BASE64.encode(long), "General").unwrap();
        long[40] ^= 0xFF;
        let b = derive(&BASE64.encode(long), "General").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_arguments_are_rejected() {
        assert_eq!(
            derive("", "General"),
            Err(PseudonymError::MissingPrivateKey)
        );
        assert_eq!(derive(&test_key(), ""), Err(PseudonymError::MissingChannelId));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert_eq!(
            derive("not base64!!!", "General"),
            Err(PseudonymError::InvalidBase64)
        );
    }

    #[test]
    fn short_keys_are_rejected() {
        let short = BASE64.encode([0u8; 16]);
        assert_eq!(derive(&short, "General"), Err(PseudonymError::KeyTooShort));
    }

    #[test]
    fn shorten_takes_a_prefix() {
        let p = derive(&test_key(), "General").unwrap();
        let s = shorten(&p, 16);
        assert_eq!(s.len(), 16);
        assert!(p.starts_with(s));
    }

    #[test]
    fn shorten_clamps_to_input_length() {
        assert_eq!(shorten("abc", 16), "abc");
        assert_eq!(shorten("abc", 0), "");
    }
}
