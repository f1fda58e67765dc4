//! Weight payload decoding.
//!
//! The scale's characteristic emits a fixed-layout byte buffer with no
//! checksum or framing beyond the payload length. The weight field occupies
//! a 14-hex-character window starting at hex-character offset 16 of the
//! payload's lowercase hex rendering; equivalently, bytes 8..15 read as an
//! unsigned big-endian integer. The window position is constant regardless
//! of total payload length.

use thiserror::Error;

use crate::types::WeightReading;

/// Offset of the weight field window in hex characters.
pub const WEIGHT_WINDOW_HEX_OFFSET: usize = 16;

/// Length of the weight field window in hex characters.
pub const WEIGHT_WINDOW_HEX_LEN: usize = 14;

/// Offset of the weight field in payload bytes.
pub const WEIGHT_FIELD_OFFSET: usize = WEIGHT_WINDOW_HEX_OFFSET / 2;

/// Length of the weight field in payload bytes.
pub const WEIGHT_FIELD_LEN: usize = WEIGHT_WINDOW_HEX_LEN / 2;

/// Minimum payload length that can carry a weight field.
pub const MIN_PAYLOAD_LEN: usize = WEIGHT_FIELD_OFFSET + WEIGHT_FIELD_LEN;

/// Errors that can occur when decoding a weight payload.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload ends before the weight field window.
    #[error("payload too short for weight field: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum payload length in bytes.
        expected: usize,
        /// Actual payload length in bytes.
        actual: usize,
    },
}

/// Decode the weight field of a raw payload into grams.
///
/// Pure and idempotent: the same payload always yields the same result.
/// A window of all zero digits decodes to `0` grams; a payload shorter
/// than the window is rejected with [`DecodeError::TooShort`] rather than
/// silently defaulting to zero.
///
/// # Example
///
/// ```
/// use scalelink_types::decode::decode_grams;
///
/// let mut payload = [0u8; 15];
/// payload[14] = 0x32;
/// assert_eq!(decode_grams(&payload), Ok(50));
/// ```
pub fn decode_grams(payload: &[u8]) -> Result<u64, DecodeError> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(DecodeError::TooShort {
            expected: MIN_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    // Seven bytes big-endian; leading zero digits fall out of the fold.
    let grams = payload[WEIGHT_FIELD_OFFSET..MIN_PAYLOAD_LEN]
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    Ok(grams)
}

/// Decode a raw payload into a [`WeightReading`].
pub fn decode_reading(payload: &[u8]) -> Result<WeightReading, DecodeError> {
    decode_grams(payload).map(WeightReading::new)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Build a payload with the given bytes in the weight field and a fixed
    /// header pattern, padded to `total_len`.
    fn payload_with_field(field: &[u8; WEIGHT_FIELD_LEN], total_len: usize) -> Vec<u8> {
        let mut payload = vec![0xA5; total_len.max(MIN_PAYLOAD_LEN)];
        payload[WEIGHT_FIELD_OFFSET..MIN_PAYLOAD_LEN].copy_from_slice(field);
        payload
    }

    /// Reference decoder following the wire protocol description literally:
    /// hex-render the payload, slice the 14-character window at offset 16,
    /// strip leading zeros, parse as hex.
    fn decode_via_hex_window(payload: &[u8]) -> Option<u64> {
        let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
        let end = WEIGHT_WINDOW_HEX_OFFSET + WEIGHT_WINDOW_HEX_LEN;
        if hex.len() < end {
            return None;
        }
        let window = &hex[WEIGHT_WINDOW_HEX_OFFSET..end];
        let trimmed = window.trim_start_matches('0');
        if trimmed.is_empty() {
            Some(0)
        } else {
            u64::from_str_radix(trimmed, 16).ok()
        }
    }

    #[test]
    fn test_decode_example_50_grams() {
        // Window hex "00000000000032" -> 0x32 = 50 decimal.
        let payload = payload_with_field(&[0, 0, 0, 0, 0, 0, 0x32], MIN_PAYLOAD_LEN);
        assert_eq!(decode_grams(&payload), Ok(50));
    }

    #[test]
    fn test_decode_all_zero_window_is_zero() {
        let payload = payload_with_field(&[0; WEIGHT_FIELD_LEN], MIN_PAYLOAD_LEN);
        assert_eq!(decode_grams(&payload), Ok(0));
    }

    #[test]
    fn test_decode_large_value() {
        let payload = payload_with_field(&[0, 0, 0, 0, 0x01, 0x86, 0xA0], 20);
        assert_eq!(decode_grams(&payload), Ok(100_000));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let short = payload_with_field(&[0, 0, 0, 0, 0, 0x04, 0xD2], MIN_PAYLOAD_LEN);
        let long = payload_with_field(&[0, 0, 0, 0, 0, 0x04, 0xD2], 24);
        assert_eq!(decode_grams(&short), decode_grams(&long));
        assert_eq!(decode_grams(&long), Ok(1234));
    }

    #[test]
    fn test_decode_too_short() {
        let payload = [0u8; MIN_PAYLOAD_LEN - 1];
        assert_eq!(
            decode_grams(&payload),
            Err(DecodeError::TooShort {
                expected: MIN_PAYLOAD_LEN,
                actual: MIN_PAYLOAD_LEN - 1,
            })
        );
        assert!(decode_grams(&[]).is_err());
    }

    #[test]
    fn test_decode_is_idempotent() {
        let payload = payload_with_field(&[0, 0, 0, 0, 0, 0x0F, 0xFF], 18);
        assert_eq!(decode_grams(&payload), decode_grams(&payload));
    }

    #[test]
    fn test_decode_reading_wraps_grams() {
        let payload = payload_with_field(&[0, 0, 0, 0, 0, 0, 0x32], MIN_PAYLOAD_LEN);
        assert_eq!(decode_reading(&payload), Ok(WeightReading::new(50)));
    }

    #[test]
    fn test_error_display_names_lengths() {
        let err = decode_grams(&[0u8; 3]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("15"));
        assert!(msg.contains('3'));
    }

    proptest! {
        /// The byte-wise decoder matches the literal hex-window formulation
        /// for any payload long enough to carry the field.
        #[test]
        fn prop_matches_hex_window_decoder(payload in proptest::collection::vec(any::<u8>(), MIN_PAYLOAD_LEN..40)) {
            prop_assert_eq!(decode_grams(&payload).ok(), decode_via_hex_window(&payload));
        }

        /// Short payloads always fail, never default to zero.
        #[test]
        fn prop_short_payloads_rejected(payload in proptest::collection::vec(any::<u8>(), 0..MIN_PAYLOAD_LEN)) {
            prop_assert!(decode_grams(&payload).is_err());
        }
    }
}
