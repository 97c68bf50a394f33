//! # relkit-core — Foundational Types for the Release Pipeline
//!
//! Every other crate in the workspace depends on `relkit-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtypes for every key.** [`Revision`], [`Category`],
//!    [`ArtifactName`], [`BuildVariant`], [`Branch`] and [`MarkerTag`]
//!    validate at construction and deserialization.
//!
//! 2. **One manifest format.** [`HashManifest`] renders the sorted
//!    `sha256sum` text used both for determinism comparison and as the
//!    only signing input ([`CanonicalBytes`]).
//!
//! 3. **One error taxonomy.** [`PipelineError`] classifies every failure
//!    into an [`ErrorKind`] with a stable exit code.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `relkit-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod location;
pub mod manifest;

pub use digest::{sha256_digest, ContentDigest, Sha256Accumulator};
pub use error::{ErrorKind, PipelineError, ValidationError};
pub use identity::{ArtifactName, Branch, BuildVariant, Category, MarkerTag, Revision};
pub use location::{set_prefix, RemoteLocation};
pub use manifest::{CanonicalBytes, HashManifest, MANIFEST_FILE_NAME, SIGNATURE_SUFFIX};
