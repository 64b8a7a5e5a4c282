//! MessagePack payload helpers.
//!
//! Thin wrappers around `rmp-serde`. Payloads are encoded with field names so
//! that scripts and tools can produce them without knowing field order.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Encode a payload to MessagePack bytes.
///
/// # Errors
///
/// Returns [`MessageError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MessageError> {
    rmp_serde::to_vec_named(value).map_err(MessageError::Encode)
}

/// Decode a payload from MessagePack bytes.
///
/// # Errors
///
/// Returns [`MessageError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, MessageError> {
    rmp_serde::from_slice(bytes).map_err(MessageError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        factor: f32,
        mode: u32,
    }

    #[test]
    fn test_encode_decode() {
        let payload = Payload {
            factor: 2.0,
            mode: 0,
        };
        let bytes = encode(&payload).unwrap();
        let restored: Payload = decode(&bytes).unwrap();
        assert_eq!(payload, restored);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Payload, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }
}
