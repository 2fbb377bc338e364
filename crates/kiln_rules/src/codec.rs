//! Stable binary encoding for keys and values.
//!
//! Keys and values are persisted by the scheduler in this form. Changing a
//! type's serde layout invalidates its previously stored results.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RuleError;

/// Encodes a value with bincode's standard configuration.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RuleError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        RuleError::Serialization {
            reason: e.to_string(),
        }
    })
}

/// Decodes a value, rejecting input with trailing bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RuleError> {
    let (value, read) =
        bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard()).map_err(
            |e| RuleError::Serialization {
                reason: e.to_string(),
            },
        )?;
    if read != bytes.len() {
        return Err(RuleError::Serialization {
            reason: format!("{} trailing bytes after value", bytes.len() - read),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        let bytes = encode("gcc -c a.c").unwrap();
        let back: String = decode(&bytes).unwrap();
        assert_eq!(back, "gcc -c a.c");
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode(&5u8).unwrap();
        bytes.push(0);
        let err = decode::<u8>(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = encode(&vec![1u32, 2, 3]).unwrap();
        assert!(decode::<Vec<u32>>(&bytes[..bytes.len() - 1]).is_err());
    }
}
