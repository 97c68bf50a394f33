//! # Content Digest — SHA-256 Identifiers for Artifact Bytes
//!
//! Defines [`ContentDigest`], the 32-byte SHA-256 value recorded for every
//! artifact in a [`HashManifest`](crate::HashManifest), and
//! [`Sha256Accumulator`] for hashing streams incrementally.
//!
//! Digests render as 64 lowercase hex characters, the same form used by
//! `sha256sum` and the manifest text format.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// A SHA-256 digest of an artifact's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32-byte digest value.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 64 hex characters. Uppercase input is accepted and
    /// normalized.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDigest`] for wrong length or
    /// non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(ValidationError::InvalidDigest(format!(
                "digest must be 64 hex chars, got {} chars",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| {
            ValidationError::InvalidDigest(format!("digest contains non-hex characters: {e}"))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Compute the SHA-256 digest of an in-memory byte slice.
pub fn sha256_digest(data: &[u8]) -> ContentDigest {
    let mut acc = Sha256Accumulator::new();
    acc.update(data);
    acc.finalize()
}

/// Incremental SHA-256 hasher for streaming large artifacts.
#[derive(Clone, Default)]
pub struct Sha256Accumulator {
    hasher: Sha256,
    len: u64,
}

impl Sha256Accumulator {
    /// Start a new digest computation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes have been fed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish and return the digest.
    pub fn finalize(self) -> ContentDigest {
        let out = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        ContentDigest(bytes)
    }
}

impl std::fmt::Debug for Sha256Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha256Accumulator(len={})", self.len)
    }
}
