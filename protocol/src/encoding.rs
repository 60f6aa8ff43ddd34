//! # Wire Encodings
//!
//! Explicit serde adapters for the value shapes JSON has no native form for.
//! They are applied field by field with `#[serde(with = "...")]`, so every
//! binary or wide-integer field states its encoding at the declaration site.
//!
//! - [`hex_array`] - fixed-length byte arrays as lowercase hex. Wrong lengths
//!   are rejected at decode time.
//! - [`base64_bytes`] - variable-length payloads as standard padded base64.
//! - [`decimal`] - `u128` as a decimal string. Plain JSON integers are
//!   accepted on input as long as they fit in a `u64`.

/// Fixed-length byte arrays as hex strings.
pub mod hex_array {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        decode::<N>(&s).map_err(D::Error::custom)
    }

    /// Decodes a hex string into exactly `N` bytes.
    pub fn decode<const N: usize>(s: &str) -> Result<[u8; N], String> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {}", e))?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| format!("expected {} bytes, got {}", N, len))
    }
}

/// Arbitrary byte strings as base64.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(D::Error::custom)
    }
}

/// `u128` as a decimal string.
pub mod decimal {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DecimalVisitor)
    }

    /// Parses an unsigned decimal string. Signs, whitespace and empty strings
    /// are rejected, as is anything that overflows `u128`.
    pub fn parse(s: &str) -> Result<u128, String> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("not an unsigned decimal integer: {:?}", s));
        }
        s.parse::<u128>()
            .map_err(|_| format!("integer out of range: {}", s))
    }

    struct DecimalVisitor;

    impl<'de> Visitor<'de> for DecimalVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer encoded as a decimal string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            parse(v).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom("negative integer"))
        }
    }
}
