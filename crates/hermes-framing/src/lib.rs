//! # Hermes Framing - Fixed-Size Frame Codec
//!
//! Pads serialized envelopes to one of four canonical frame sizes before
//! they hit the wire, so an observer cannot correlate messages by length.
//!
//! ## Frame layout
//!
//! ```text
//! +-----------------+----------------------+-------------------+
//! | payload (N)     | random fill          | N as u16 BE (2)   |
//! +-----------------+----------------------+-------------------+
//! |<------------------- canonical frame size ----------------->|
//! ```
//!
//! The fill bytes are cryptographically random; a frame of all-zero padding
//! would itself be a distinguisher.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Canonical frame sizes in ascending order.
pub const FRAME_SIZES: [usize; 4] = [1024, 4096, 16384, 65536];

/// Largest payload that fits the largest frame alongside the length suffix.
pub const MAX_PAYLOAD: usize = 65534;

/// Framing codec failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Payload exceeds what the largest canonical frame can hold.
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte frame limit")]
    PayloadTooLarge {
        /// Offending payload length.
        len: usize,
    },
    /// Frame shorter than the 2-byte length suffix.
    #[error("frame of {len} bytes is too short to contain a length suffix")]
    FrameTooShort {
        /// Offending frame length.
        len: usize,
    },
    /// Decoded length exceeds the space the frame actually has.
    #[error("decoded payload length {len} exceeds frame capacity {capacity}")]
    LengthOutOfRange {
        /// Decoded payload length.
        len: usize,
        /// Bytes available ahead of the length suffix.
        capacity: usize,
    },
}

/// Pad a payload to the smallest canonical frame that fits it plus the
/// 2-byte big-endian length suffix.
pub fn pad(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let len = payload.len();
    if len > MAX_PAYLOAD {
        return Err(FramingError::PayloadTooLarge { len });
    }

    let needed = len + 2;
    let frame_size = FRAME_SIZES
        .iter()
        .copied()
        .find(|size| *size >= needed)
        .ok_or(FramingError::PayloadTooLarge { len })?;

    let mut frame = vec![0u8; frame_size];
    frame[..len].copy_from_slice(payload);

    let fill_end = frame_size - 2;
    if fill_end > len {
        OsRng.fill_bytes(&mut frame[len..fill_end]);
    }

    frame[frame_size - 2..].copy_from_slice(&(len as u16).to_be_bytes());
    Ok(frame)
}

/// Recover the original payload from a padded frame by reading the
/// big-endian length suffix.
pub fn unpad(frame: &[u8]) -> Result<Vec<u8>, FramingError> {
    if frame.len() < 2 {
        return Err(FramingError::FrameTooShort { len: frame.len() });
    }

    let suffix = [frame[frame.len() - 2], frame[frame.len() - 1]];
    let len = u16::from_be_bytes(suffix) as usize;
    let capacity = frame.len() - 2;
    if len > capacity {
        return Err(FramingError::LengthOutOfRange { len, capacity });
    }

    Ok(frame[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_payload_uses_smallest_frame() {
        let frame = pad(&[]).unwrap();
        assert_eq!(frame.len(), 1024);
        assert_eq!(unpad(&frame).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn frame_size_steps_at_boundaries() {
        // payload + 2 == frame size is the largest fit per tier
        assert_eq!(pad(&vec![7u8; 1022]).unwrap().len(), 1024);
        assert_eq!(pad(&vec![7u8; 1023]).unwrap().len(), 4096);
        assert_eq!(pad(&vec![7u8; 4094]).unwrap().len(), 4096);
        assert_eq!(pad(&vec![7u8; 4095]).unwrap().len(), 16384);
        assert_eq!(pad(&vec![7u8; 16382]).unwrap().len(), 16384);
        assert_eq!(pad(&vec![7u8; 16383]).unwrap().len(), 65536);
    }

    #[test]
    fn max_payload_fits_largest_frame() {
        let payload = vec![1u8; MAX_PAYLOAD];
        let frame = pad(&payload).unwrap();
        assert_eq!(frame.len(), 65536);
        assert_eq!(unpad(&frame).unwrap(), payload);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(
            pad(&payload),
            Err(FramingError::PayloadTooLarge { len: MAX_PAYLOAD + 1 })
        );
    }

    #[test]
    fn short_frame_is_rejected() {
        assert_eq!(unpad(&[]), Err(FramingError::FrameTooShort { len: 0 }));
        assert_eq!(unpad(&[0]), Err(FramingError::FrameTooShort { len: 1 }));
    }

    #[test]
    fn corrupted_length_suffix_is_rejected() {
        // 16-byte frame claiming a 300-byte payload
        let mut frame = vec![0u8; 16];
        frame[14..].copy_from_slice(&300u16.to_be_bytes());
        assert_eq!(
            unpad(&frame),
            Err(FramingError::LengthOutOfRange { len: 300, capacity: 14 })
        );
    }

    #[test]
    fn two_byte_frame_with_zero_length_is_valid() {
        assert_eq!(unpad(&[0, 0]).unwrap(), Vec::<u8>::new());
    }

    proptest! {
        #[test]
        fn round_trip_recovers_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let frame = pad(&payload).unwrap();
            prop_assert!(FRAME_SIZES.contains(&frame.len()));
            prop_assert_eq!(unpad(&frame).unwrap(), payload);
        }

        #[test]
        fn frame_is_smallest_canonical_fit(len in 0usize..=MAX_PAYLOAD) {
            let payload = vec![0xAB; len];
            let frame = pad(&payload).unwrap();
            let expected = FRAME_SIZES
                .iter()
                .copied()
                .find(|size| *size >= len + 2)
                .unwrap();
            prop_assert_eq!(frame.len(), expected);
        }
    }
}
