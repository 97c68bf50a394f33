//! # Key Provider Abstraction
//!
//! Abstracts where the release signing key lives behind a trait:
//!
//! - [`LocalKeyProvider`]: in-memory key, for tests and one-shot signing.
//! - [`EnvKeyProvider`]: hex-encoded 32-byte seed in an environment
//!   variable (default `RELKIT_SIGNING_KEY`), the usual setup on CI
//!   builders where secrets are injected via environment.
//! - [`FileKeyProvider`]: hex-encoded seed in a file, as written by
//!   `relkit keygen`.
//!
//! ## Security Invariants
//!
//! - Key material is zeroized on drop.
//! - `KeyProvider` is `Send + Sync` so a provider can be shared by stages.
//! - Signing input is `&CanonicalBytes` (never raw bytes).

use std::path::{Path, PathBuf};

use relkit_core::CanonicalBytes;

use crate::ed25519::{Ed25519Signature, SigningKey, VerifyingKey};
use crate::error::CryptoError;

/// Environment variable consulted when no key source is configured.
pub const DEFAULT_SIGNING_KEY_ENV: &str = "RELKIT_SIGNING_KEY";

/// Backend that holds an Ed25519 key and signs manifests with it.
pub trait KeyProvider: Send + Sync {
    /// Sign canonical manifest bytes.
    fn sign(&self, data: &CanonicalBytes) -> Result<Ed25519Signature, CryptoError>;

    /// The public half of the managed key.
    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError>;

    /// Short name for diagnostics.
    fn provider_name(&self) -> &str;
}

// ─── LocalKeyProvider ────────────────────────────────────────────────────

/// Holds a [`SigningKey`] directly in process memory.
pub struct LocalKeyProvider {
    key: SigningKey,
}

impl LocalKeyProvider {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut rand_core::OsRng))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }
}

impl KeyProvider for LocalKeyProvider {
    fn sign(&self, data: &CanonicalBytes) -> Result<Ed25519Signature, CryptoError> {
        Ok(self.key.sign(data))
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        Ok(self.key.verifying_key())
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

// ─── EnvKeyProvider ──────────────────────────────────────────────────────

/// Loads the signing seed from an environment variable once, at
/// construction.
///
/// ```bash
/// export RELKIT_SIGNING_KEY="9f86d0..."  # 64 hex chars
/// ```
pub struct EnvKeyProvider {
    key: SigningKey,
    var_name: String,
}

impl EnvKeyProvider {
    /// Load from `var_name`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::KeyUnavailable`] if the variable is unset, or a
    /// decoding error if it does not hold a 64-hex-char seed.
    pub fn from_env(var_name: &str) -> Result<Self, CryptoError> {
        let hex = zeroize::Zeroizing::new(std::env::var(var_name).map_err(|_| {
            CryptoError::KeyUnavailable(format!("environment variable {var_name} not set"))
        })?);
        let key = SigningKey::from_hex(&hex).map_err(|e| match e {
            CryptoError::InvalidSigningKey(msg) => {
                CryptoError::InvalidSigningKey(format!("{var_name}: {msg}"))
            }
            other => other,
        })?;
        tracing::debug!(var = var_name, "loaded signing key from environment");
        Ok(Self {
            key,
            var_name: var_name.to_string(),
        })
    }

    /// The variable the key was read from.
    pub fn var_name(&self) -> &str {
        &self.var_name
    }
}

impl KeyProvider for EnvKeyProvider {
    fn sign(&self, data: &CanonicalBytes) -> Result<Ed25519Signature, CryptoError> {
        Ok(self.key.sign(data))
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        Ok(self.key.verifying_key())
    }

    fn provider_name(&self) -> &str {
        "env"
    }
}

// ─── FileKeyProvider ─────────────────────────────────────────────────────

/// Loads the signing seed from a hex key file.
pub struct FileKeyProvider {
    key: SigningKey,
    path: PathBuf,
}

impl FileKeyProvider {
    /// Read and decode `path`. Surrounding whitespace is ignored.
    pub fn from_file(path: &Path) -> Result<Self, CryptoError> {
        let hex = zeroize::Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            CryptoError::KeyUnavailable(format!("cannot read {}: {e}", path.display()))
        })?);
        let key = SigningKey::from_hex(&hex)?;
        tracing::debug!(path = %path.display(), "loaded signing key from file");
        Ok(Self {
            key,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyProvider for FileKeyProvider {
    fn sign(&self, data: &CanonicalBytes) -> Result<Ed25519Signature, CryptoError> {
        Ok(self.key.sign(data))
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        Ok(self.key.verifying_key())
    }

    fn provider_name(&self) -> &str {
        "file"
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
