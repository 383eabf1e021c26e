//! Submission-time image validation. Rejections here never reach the queue.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ValidationError;

/// Uploads below this declared/actual size are rejected outright.
const MIN_IMAGE_BYTES: usize = 1_000;
/// Decoded payloads smaller than this are not plausible images.
const MIN_DECODED_BYTES: usize = 750;
/// Decoded payloads above this are refused.
const MAX_DECODED_BYTES: usize = 10 * 1024 * 1024;

/// Check a base64 image payload and normalize it to a data URI.
///
/// `declared_len` is the size the caller claims for the upload; both the
/// declared and the actual length must clear the minimum.
pub fn validate_image(payload: &[u8], declared_len: usize) -> Result<String, ValidationError> {
    if payload.is_empty() {
        return Err(ValidationError::Missing);
    }
    if declared_len < MIN_IMAGE_BYTES || payload.len() < MIN_IMAGE_BYTES {
        return Err(ValidationError::TooSmall(declared_len.min(payload.len())));
    }

    let text = std::str::from_utf8(payload).map_err(|_| ValidationError::NotBase64)?;
    let trimmed = text.trim();
    let decoded = STANDARD
        .decode(trimmed)
        .map_err(|_| ValidationError::NotBase64)?;

    if decoded.len() < MIN_DECODED_BYTES {
        return Err(ValidationError::DecodedTooSmall(decoded.len()));
    }
    if decoded.len() > MAX_DECODED_BYTES {
        return Err(ValidationError::TooLarge(decoded.len()));
    }

    Ok(format!("data:image/jpeg;base64,{trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(len: usize) -> String {
        STANDARD.encode(vec![0x5au8; len])
    }

    #[test]
    fn empty_payload_is_missing() {
        assert_eq!(validate_image(b"", 0), Err(ValidationError::Missing));
    }

    #[test]
    fn tiny_payload_rejected() {
        let err = validate_image(b"0123456789", 10).unwrap_err();
        assert!(matches!(err, ValidationError::TooSmall(10)));
    }

    #[test]
    fn declared_size_gates_even_large_payloads() {
        let payload = encoded(2_000);
        let err = validate_image(payload.as_bytes(), 10).unwrap_err();
        assert!(matches!(err, ValidationError::TooSmall(10)));
    }

    #[test]
    fn non_base64_rejected() {
        let junk = "!".repeat(2_000);
        let err = validate_image(junk.as_bytes(), junk.len()).unwrap_err();
        assert_eq!(err, ValidationError::NotBase64);
    }

    #[test]
    fn undersized_decode_rejected() {
        // 749 raw bytes encode to exactly 1000 base64 chars: clears the
        // payload gate, fails the decoded minimum.
        let payload = encoded(749);
        assert_eq!(payload.len(), MIN_IMAGE_BYTES);
        let err = validate_image(payload.as_bytes(), payload.len()).unwrap_err();
        assert!(matches!(err, ValidationError::DecodedTooSmall(749)));
    }

    #[test]
    fn oversized_decode_rejected() {
        let payload = encoded(MAX_DECODED_BYTES + 1);
        let err = validate_image(payload.as_bytes(), payload.len()).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge(_)));
    }

    #[test]
    fn valid_payload_becomes_data_uri() {
        let payload = encoded(2_000);
        let uri = validate_image(payload.as_bytes(), payload.len()).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert!(uri.ends_with(&payload));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let payload = format!("\n{}\n", encoded(2_000));
        let uri = validate_image(payload.as_bytes(), payload.len()).unwrap();
        assert!(!uri.contains('\n'));
    }
}
