//! # relkit-pipeline — Release Stages
//!
//! The stages that move one revision's build outputs from the build
//! hosts to the promoted release:
//!
//! | Module | Stage |
//! |--------|-------|
//! | [`image`] | Package binaries and a root filesystem into disk/update images |
//! | [`verifier`] | Compare two independent builds of one revision |
//! | [`signer`] | Detached Ed25519 signatures over `SHA256SUMS` |
//! | [`publisher`] | Create-if-absent upload, manifest last, then promotion |
//! | [`promotion`] | Branch markers, advanced by compare-and-swap under an ancestry rule |
//! | [`resolve`] / [`fetcher`] | "Latest complete" lookup and parallel verified download |
//! | [`descriptor`] | Release descriptor for external consumers |
//! | [`release`] | verify → sign → publish → promote for one revision |
//!
//! Stages share no in-process state. Everything they exchange goes
//! through an [`ObjectStore`](relkit_store::ObjectStore), so any stage can
//! run on a different host from the others.

pub mod ancestry;
pub mod artifact_set;
pub mod config;
pub mod descriptor;
pub mod fetcher;
pub mod image;
pub mod promotion;
pub mod publisher;
pub mod release;
pub mod resolve;
pub mod signer;
pub mod stage;
pub mod verifier;

pub use ancestry::{same_commit, AncestryOracle, GitAncestry, LinearHistory};
pub use artifact_set::{load_manifest, LocalArtifactSet};
pub use config::{ConfigError, PipelineConfig};
pub use descriptor::{describe_release, DownloadRef, ReleaseDescriptor, UpgradeContent};
pub use fetcher::{resolve_revision, FetchReport, FetchRequest, FetchedFile, Fetcher, RevisionSelector};
pub use image::{BuiltImages, ImageBuilder, ImageSpec};
pub use promotion::{marker_key, AdvanceOutcome, MarkerRecord, PromotionTracker};
pub use publisher::{PromotionRequest, PromotionStatus, PublishReport, PublishRequest, Publisher};
pub use release::{run_release, ReleaseContext, ReleaseInputs, ReleaseReport, ReleaseStatus};
pub use resolve::{complete_revisions, resolve_latest};
pub use signer::{
    check_recorded_manifest, read_signatures, sign_directory, sign_manifest, verify_directory,
    verify_signatures, SignatureFile, SignatureMode,
};
pub use stage::retry_transient;
pub use verifier::{
    unified_diff, verify_manifests, BuildManifest, DigestMismatch, VerificationReport,
};
