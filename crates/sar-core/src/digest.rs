//! # Content Digests
//!
//! The integrity codec for stored artefacts. Defines [`ContentDigest`] and
//! the streaming [`Sha256Accumulator`] used while bytes are written, plus
//! [`digest_reader()`] for re-verifying bytes already on disk.
//!
//! ## Wire Form
//!
//! Digests render as `sha256:<64 lowercase hex>` in record files, response
//! headers and CLI output, and parse back from the same form.
//!
//! ## Verification
//!
//! [`verify()`] and [`ContentDigest::ct_eq()`] compare in constant time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ValidationError;

/// Read buffer size for [`digest_reader()`].
const READ_CHUNK: usize = 64 * 1024;

/// The hash algorithm used to compute a content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256.
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed-length content digest with its algorithm tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Create a SHA-256 digest from raw bytes.
    pub fn sha256(bytes: [u8; 32]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes,
        }
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Constant-time equality.
    pub fn ct_eq(&self, other: &ContentDigest) -> bool {
        self.algorithm == other.algorithm && bool::from(self.bytes.ct_eq(&other.bytes))
    }

    /// Parse a bare 64-character hex string as a SHA-256 digest.
    pub fn from_hex(hex: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDigest(hex.to_string());
        if hex.len() != 64 || !hex.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| invalid())?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self::sha256(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("sha256", hex)) => {
                Self::from_hex(hex).map_err(|_| ValidationError::InvalidDigest(s.to_string()))
            }
            _ => Err(ValidationError::InvalidDigest(s.to_string())),
        }
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 hasher producing a [`ContentDigest`].
///
/// Feed chunks with [`update()`](Sha256Accumulator::update) as they stream
/// past; the byte count is tracked alongside.
#[derive(Debug, Clone, Default)]
pub struct Sha256Accumulator {
    hasher: Sha256,
    len: u64,
}

impl Sha256Accumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes have been fed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consume the accumulator and return the digest.
    pub fn finalize(self) -> ContentDigest {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        ContentDigest::sha256(bytes)
    }
}

/// Digest an in-memory byte slice.
pub fn digest(content: &[u8]) -> ContentDigest {
    let mut acc = Sha256Accumulator::new();
    acc.update(content);
    acc.finalize()
}

/// Digest everything a reader yields, without buffering it whole.
///
/// Returns the digest and the number of bytes read.
pub async fn digest_reader<R>(mut reader: R) -> std::io::Result<(ContentDigest, u64)>
where
    R: AsyncRead + Unpin,
{
    let mut acc = Sha256Accumulator::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        acc.update(&buf[..n]);
    }
    let len = acc.len();
    Ok((acc.finalize(), len))
}

/// Check `content` against an expected digest in constant time.
pub fn verify(content: &[u8], expected: &ContentDigest) -> bool {
    digest(content).ct_eq(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256 of the empty string and of "abc" (FIPS 180-2 test vectors).
    const EMPTY_HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_HEX: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn digest_known_vectors() {
        assert_eq!(digest(b"").to_hex(), EMPTY_HEX);
        assert_eq!(digest(b"abc").to_hex(), ABC_HEX);
    }

    #[test]
    fn accumulator_matches_one_shot() {
        let mut acc = Sha256Accumulator::new();
        acc.update(b"a");
        acc.update(b"");
        acc.update(b"bc");
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.finalize(), digest(b"abc"));
    }

    #[test]
    fn verify_accepts_and_rejects() {
        let d = digest(b"payload");
        assert!(verify(b"payload", &d));
        assert!(!verify(b"payloaD", &d));
    }

    #[test]
    fn display_and_parse_roundtrip() {
        let d = digest(b"abc");
        let rendered = d.to_string();
        assert_eq!(rendered, format!("sha256:{ABC_HEX}"));
        let parsed: ContentDigest = rendered.parse().unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("".parse::<ContentDigest>().is_err());
        assert!(ABC_HEX.parse::<ContentDigest>().is_err()); // missing prefix
        assert!(format!("md5:{ABC_HEX}").parse::<ContentDigest>().is_err());
        assert!("sha256:abc".parse::<ContentDigest>().is_err());
        let bad = format!("sha256:{}g", &ABC_HEX[..63]);
        assert!(bad.parse::<ContentDigest>().is_err());
        assert!(ContentDigest::from_hex(&"é".repeat(32)).is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let d = digest(b"abc");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"sha256:{ABC_HEX}\""));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[tokio::test]
    async fn digest_reader_streams() {
        let data = vec![7u8; READ_CHUNK * 2 + 13];
        let (d, len) = digest_reader(&data[..]).await.unwrap();
        assert_eq!(len, data.len() as u64);
        assert_eq!(d, digest(&data));
    }
}
