//! # Hermes Crypto - Signing and Sealing Primitives
//!
//! The cryptographic collaborator consumed by the mesh core: detached
//! Ed25519 signatures, symmetric channel sealing, forward-secret
//! direct-message sealing, and key material generation.
//!
//! ## Design Principles
//!
//! **Fail-closed verification**: [`sign::verify_detached`] and the
//! `open_*` functions never throw into the receive path. Malformed keys,
//! corrupt base64, or failed authentication all collapse to `false` /
//! `None`, which the transport interprets as "drop".
//!
//! **Ephemeral keys for direct messages**: each direct message is sealed
//! under a fresh X25519 keypair, so compromise of a long-term key never
//! exposes past traffic.

pub mod encoding;
pub mod keys;
pub mod seal;
pub mod sign;

pub use encoding::{b64_decode, b64_encode};
pub use keys::{generate_channel_key, generate_keypair, Keypair};
pub use seal::{open_channel, open_direct, seal_channel, seal_direct};
pub use sign::{sign_detached, verify_detached};

use thiserror::Error;

/// Failures from key parsing, sealing, and signing.
///
/// Only the outbound (sending) path sees these; inbound verification and
/// opening are fail-closed and return sentinels instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Input was not valid base64.
    #[error("input is not valid base64")]
    InvalidBase64,
    /// Key material decoded to an unusable length.
    #[error("key material has invalid length {len}")]
    InvalidKeyLength {
        /// Decoded length in bytes.
        len: usize,
    },
    /// Key bytes failed validation (e.g. mismatched keypair halves).
    #[error("key material is malformed")]
    InvalidKey,
    /// AEAD encryption rejected its inputs.
    #[error("encryption failed")]
    EncryptionFailed,
}
