//! Base64 codec shared by every key- and payload-carrying field.

use crate::CryptoError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Encode bytes as standard (padded) base64.
pub fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

/// Decode standard base64 into bytes.
pub fn b64_decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64.decode(text).map_err(|_| CryptoError::InvalidBase64)
}

/// Decode base64 into a fixed-size array, checking the length.
pub(crate) fn b64_decode_array<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = b64_decode(text)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { len })
}
