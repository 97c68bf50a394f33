//! # relkit-crypto — Signing and Hashing for Release Artifacts
//!
//! - [`ed25519`]: key generation, signing and strict verification of
//!   detached manifest signatures. Signing takes
//!   [`CanonicalBytes`](relkit_core::CanonicalBytes) only.
//! - [`key_provider`]: where the signing key comes from (memory,
//!   environment variable, key file).
//! - [`sha256`]: streaming file digests for large artifacts.
//!
//! ## Crate Policy
//!
//! - Depends only on `relkit-core` internally.
//! - Private keys never implement `Serialize` and are zeroized on drop.

pub mod ed25519;
pub mod error;
pub mod key_provider;
pub mod sha256;

pub use ed25519::{Ed25519Signature, SigningKey, VerifyingKey};
pub use error::CryptoError;
pub use key_provider::{
    EnvKeyProvider, FileKeyProvider, KeyProvider, LocalKeyProvider, DEFAULT_SIGNING_KEY_ENV,
};
pub use sha256::{sha256_file, sha256_reader};
