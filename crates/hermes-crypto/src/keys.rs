//! Key material generation and parsing.

use crate::encoding::{b64_decode, b64_decode_array, b64_encode};
use crate::CryptoError;
use ed25519_dalek::{SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use rand::RngCore;

/// Length of a symmetric channel key in bytes.
pub const CHANNEL_KEY_LENGTH: usize = 32;

/// A base64-encoded Ed25519 identity keypair.
///
/// The private half carries the 64-byte seed-plus-public layout, matching
/// the encoding every other mesh node produces and consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    /// Public key, base64 of 32 bytes.
    pub pub_key: String,
    /// Private key, base64 of 64 bytes (seed || public).
    pub priv_key: String,
}

/// Generate a fresh Ed25519 identity keypair.
pub fn generate_keypair() -> Keypair {
    let signing = SigningKey::generate(&mut OsRng);
    Keypair {
        pub_key: b64_encode(signing.verifying_key().as_bytes()),
        priv_key: b64_encode(signing.to_keypair_bytes()),
    }
}

/// Generate a fresh random symmetric channel key, base64.
pub fn generate_channel_key() -> String {
    let mut key = [0u8; CHANNEL_KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    b64_encode(key)
}

/// Parse a base64 private key, accepting either the 64-byte keypair layout
/// or a bare 32-byte seed.
pub(crate) fn signing_key_from_b64(private_key_b64: &str) -> Result<SigningKey, CryptoError> {
    let bytes = b64_decode(private_key_b64)?;
    match bytes.len() {
        SECRET_KEY_LENGTH => {
            let seed: [u8; SECRET_KEY_LENGTH] = bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKey)?;
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let pair: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
            SigningKey::from_keypair_bytes(&pair).map_err(|_| CryptoError::InvalidKey)
        }
        len => Err(CryptoError::InvalidKeyLength { len }),
    }
}

/// Parse a base64 Ed25519 public key.
pub(crate) fn verifying_key_from_b64(public_key_b64: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = b64_decode_array::<32>(public_key_b64)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidKey)
}
