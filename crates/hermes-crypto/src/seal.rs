//! Authenticated encryption for channel and direct messages.
//!
//! Channel messages are sealed under the shared channel key with
//! XChaCha20-Poly1305. Direct messages use an ephemeral X25519 key
//! agreement against the recipient's identity key (converted from its
//! Ed25519 form), an HKDF-SHA256 key derivation binding both public keys,
//! and the same AEAD. The ephemeral public key travels inside the payload;
//! the ephemeral secret is dropped after sealing, so past direct messages
//! stay sealed even if a long-term key later leaks.

use crate::encoding::{b64_decode, b64_decode_array, b64_encode};
use crate::keys::{signing_key_from_b64, verifying_key_from_b64};
use crate::CryptoError;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use hermes_core::SealedPayload;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// Domain separator for direct-message key derivation.
const DIRECT_ENCRYPT_DOMAIN: &[u8] = b"HERMES_DIRECT_ENCRYPT_v1";

/// Size of the XChaCha20-Poly1305 nonce.
const NONCE_SIZE: usize = 24;

/// Seal a plaintext under a shared symmetric channel key.
pub fn seal_channel(plaintext: &str, channel_key_b64: &str) -> Result<SealedPayload, CryptoError> {
    let key_bytes = b64_decode_array::<32>(channel_key_b64)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedPayload {
        encrypted: b64_encode(ciphertext),
        nonce: b64_encode(nonce),
        ephemeral_pub_key: None,
    })
}

/// Open a channel-sealed payload.
///
/// Fail-closed: wrong key, corrupt fields, or a tampered ciphertext all
/// yield `None`.
pub fn open_channel(sealed: &SealedPayload, channel_key_b64: &str) -> Option<String> {
    let key_bytes = b64_decode_array::<32>(channel_key_b64).ok()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let nonce = b64_decode_array::<NONCE_SIZE>(&sealed.nonce).ok()?;
    let ciphertext = b64_decode(&sealed.encrypted).ok()?;

    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .ok()?;
    String::from_utf8(plaintext).ok()
}

/// Seal a plaintext to a recipient's long-term public key with a fresh
/// ephemeral X25519 keypair.
pub fn seal_direct(plaintext: &str, recipient_pub_b64: &str) -> Result<SealedPayload, CryptoError> {
    let recipient_point = verifying_key_from_b64(recipient_pub_b64)?.to_montgomery();

    let mut ephemeral_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut ephemeral_bytes);
    let ephemeral_scalar = Scalar::from_bytes_mod_order(ephemeral_bytes);
    let ephemeral_public = MontgomeryPoint::mul_base(&ephemeral_scalar);

    let shared_secret = ephemeral_scalar * recipient_point;
    let key = derive_direct_key(
        shared_secret.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient_point.as_bytes(),
    )?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedPayload {
        encrypted: b64_encode(ciphertext),
        nonce: b64_encode(nonce),
        ephemeral_pub_key: Some(b64_encode(ephemeral_public.as_bytes())),
    })
}

/// Open a direct-sealed payload with our long-term private key.
///
/// Fail-closed: a payload without an ephemeral key, a key agreement that
/// does not reproduce the sender's symmetric key, or a tampered ciphertext
/// all yield `None`.
pub fn open_direct(sealed: &SealedPayload, own_private_b64: &str) -> Option<String> {
    let signing = signing_key_from_b64(own_private_b64).ok()?;
    let our_scalar = signing.to_scalar();
    let our_point = signing.verifying_key().to_montgomery();

    let ephemeral_b64 = sealed.ephemeral_pub_key.as_ref()?;
    let ephemeral_bytes = b64_decode_array::<32>(ephemeral_b64).ok()?;
    let ephemeral_point = MontgomeryPoint(ephemeral_bytes);

    let shared_secret = our_scalar * ephemeral_point;
    let key = derive_direct_key(
        shared_secret.as_bytes(),
        &ephemeral_bytes,
        our_point.as_bytes(),
    )
    .ok()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));

    let nonce = b64_decode_array::<NONCE_SIZE>(&sealed.nonce).ok()?;
    let ciphertext = b64_decode(&sealed.encrypted).ok()?;

    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
        .ok()?;
    String::from_utf8(plaintext).ok()
}

/// Derive the direct-message AEAD key from the X25519 shared secret,
/// binding both public keys into the expansion.
fn derive_direct_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<[u8; 32], CryptoError> {
    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(DIRECT_ENCRYPT_DOMAIN), shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(key)
}
