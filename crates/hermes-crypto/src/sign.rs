//! Detached Ed25519 signatures over message content.
//!
//! Every envelope is signed with the sender's long-term key, including
//! anonymized channel messages: relays and recipients that hold the sender
//! key out-of-band can authenticate without the envelope revealing a
//! routable identity.

use crate::encoding::{b64_decode, b64_encode};
use crate::keys::{signing_key_from_b64, verifying_key_from_b64};
use crate::CryptoError;
use ed25519_dalek::{Signature, Signer, Verifier};

/// Sign a message string, returning the detached signature as base64.
pub fn sign_detached(message: &str, private_key_b64: &str) -> Result<String, CryptoError> {
    let key = signing_key_from_b64(private_key_b64)?;
    let signature = key.sign(message.as_bytes());
    Ok(b64_encode(signature.to_bytes()))
}

/// Verify a detached signature.
///
/// Fail-closed: any malformed key, malformed signature, or verification
/// failure returns `false`. This function never errors or panics; it sits
/// directly on the receive hot path.
pub fn verify_detached(message: &str, signature_b64: &str, public_key_b64: &str) -> bool {
    let Ok(key) = verifying_key_from_b64(public_key_b64) else {
        return false;
    };
    let Ok(sig_bytes) = b64_decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    key.verify(message.as_bytes(), &signature).is_ok()
}
