use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::Error;

/// SHA-256 digest naming an object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub const LEN: usize = 32;
    pub const HEX_LEN: usize = 64;

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// create from a slice that must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidChecksumLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// SHA-256 of `data`
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// parse from a 64 character lowercase hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        validate_checksum_string(s)?;
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr).map_err(|_| Error::InvalidChecksum(s.to_string()))?;
        Ok(Self(arr))
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// split into path components for the loose object layout
    /// returns (first 2 hex chars, remaining 62 hex chars)
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

/// check that `s` is a valid textual checksum
///
/// case is significant: only `[0-9a-f]` is accepted.
pub fn validate_checksum_string(s: &str) -> crate::Result<()> {
    if s.len() != Checksum::HEX_LEN {
        return Err(Error::InvalidChecksum(s.to_string()));
    }
    if !s.bytes().all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c)) {
        return Err(Error::InvalidChecksum(s.to_string()));
    }
    Ok(())
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..12])
    }
}

impl std::str::FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// streaming hasher for content that arrives in pieces
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// feed bytes
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// finalize and return checksum
    pub fn finalize(self) -> Checksum {
        Checksum(self.inner.finalize().into())
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";

    #[test]
    fn test_checksum_hex_roundtrip() {
        let original = Checksum::from_hex(SAMPLE).unwrap();
        let hex = original.to_hex();
        assert_eq!(hex, SAMPLE);
        let parsed = Checksum::from_hex(&hex).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_checksum_invalid_hex() {
        assert!(Checksum::from_hex("not valid hex").is_err());
        assert!(Checksum::from_hex("abcd").is_err());
        assert!(Checksum::from_hex(&format!("{}ff", SAMPLE)).is_err());
        // 64 chars but one is not hex
        let bad = format!("g{}", &SAMPLE[1..]);
        assert!(Checksum::from_hex(&bad).is_err());
    }

    #[test]
    fn test_checksum_rejects_uppercase() {
        let upper = SAMPLE.to_uppercase();
        assert!(matches!(
            Checksum::from_hex(&upper),
            Err(Error::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_checksum_from_slice() {
        assert!(Checksum::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            Checksum::from_slice(&[0u8; 16]),
            Err(Error::InvalidChecksumLength(16))
        ));
    }

    #[test]
    fn test_digest_known_value() {
        // sha256 of the empty string
        assert_eq!(
            Checksum::digest(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_streaming_hasher() {
        let direct = Checksum::digest(b"helloworld");
        let mut streaming = Hasher::new();
        streaming.update(b"hello");
        streaming.update(b"world");
        assert_eq!(direct, streaming.finalize());
    }

    #[test]
    fn test_checksum_path_components() {
        let c = Checksum::from_hex(SAMPLE).unwrap();
        let (dir, file) = c.to_path_components();
        assert_eq!(dir, "ab");
        assert_eq!(file, &SAMPLE[2..]);
    }

    #[test]
    fn test_checksum_ordering() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[31] = 1;
        b[0] = 1;
        assert!(Checksum::from_bytes(a) < Checksum::from_bytes(b));
    }

    #[test]
    fn test_checksum_serde_json() {
        let c = Checksum::from_hex(SAMPLE).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", SAMPLE));
        let parsed: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(c, parsed);
    }

    proptest! {
        #[test]
        fn prop_hex_roundtrip(bytes in any::<[u8; 32]>()) {
            let c = Checksum::from_bytes(bytes);
            prop_assert_eq!(Checksum::from_hex(&c.to_hex()).unwrap(), c);
        }

        #[test]
        fn prop_wrong_length_rejected(s in "[0-9a-f]{0,80}") {
            prop_assume!(s.len() != 64);
            prop_assert!(Checksum::from_hex(&s).is_err());
        }
    }
}
