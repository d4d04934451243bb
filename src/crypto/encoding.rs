/// `0x`-prefixed hex, the textual byte encoding used by the chain tooling
/// for keys, transaction references and encrypted records.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("missing 0x prefix")]
    MissingPrefix,

    #[error("invalid hex: {0}")]
    Invalid(#[from] hex::FromHexError),
}

/// Encode bytes as lowercase hex with a `0x` prefix. Empty input gives `"0x"`.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode `0x`-prefixed hex. The prefix is required.
pub fn from_hex(s: &str) -> Result<Vec<u8>, HexError> {
    let digits = s.strip_prefix("0x").ok_or(HexError::MissingPrefix)?;
    Ok(hex::decode(digits)?)
}

/// Whether `s` is well-formed `0x`-prefixed hex.
pub fn is_hex(s: &str) -> bool {
    from_hex(s).is_ok()
}

/// Serde adapter for `Vec<u8>` fields stored as `0x` hex strings.
pub mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for fixed-size arrays stored as `0x` hex strings.
pub mod serde_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = super::from_hex(&s).map_err(serde::de::Error::custom)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(len, &"a fixed-size byte array"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_required() {
        assert_eq!(from_hex("0x00ff").unwrap(), vec![0x00, 0xFF]);
        assert_eq!(from_hex("00ff"), Err(HexError::MissingPrefix));
        assert!(from_hex("00ff").unwrap_err().to_string().contains("0x"));
        assert!(from_hex("0xzz").is_err());
        assert!(matches!(from_hex("0x0"), Err(HexError::Invalid(_))));
    }

    #[test]
    fn test_empty() {
        assert_eq!(to_hex(&[]), "0x");
        assert!(from_hex("0x").unwrap().is_empty());
    }

    #[test]
    fn test_is_hex() {
        assert!(is_hex("0xdeadbeef"));
        assert!(!is_hex("deadbeef"));
    }
}
