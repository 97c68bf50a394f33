//! # Cryptographic Error Types
//!
//! Structured errors for all operations in `relkit-crypto`.

use relkit_core::PipelineError;
use thiserror::Error;

/// Errors from signing, verification, key loading and file hashing.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("Ed25519 verification failed: {0}")]
    VerificationFailed(String),

    /// Invalid Ed25519 signature encoding.
    #[error("invalid Ed25519 signature: {0}")]
    InvalidSignature(String),

    /// Invalid Ed25519 public key.
    #[error("invalid Ed25519 public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid Ed25519 signing key material.
    #[error("invalid Ed25519 signing key: {0}")]
    InvalidSigningKey(String),

    /// Hex decoding error.
    #[error("hex decode error: {0}")]
    HexDecode(String),

    /// Key material could not be located (unset variable, missing file).
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),

    /// I/O error while hashing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CryptoError> for PipelineError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Io(io) => PipelineError::io("hashing", io),
            other => PipelineError::Crypto(other.to_string()),
        }
    }
}
