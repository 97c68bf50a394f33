//! # Error Types — Pipeline Error Taxonomy
//!
//! Defines the error types shared by every relkit crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Correctness failures (`Conflict`, `AncestryViolation`, `Integrity`)
//!   carry the revision, location, and expected vs actual digests so an
//!   operator can diagnose them without re-running the stage.
//! - `TransientIo` is the only kind a stage driver may retry.
//! - Every kind maps to a distinct process exit code via
//!   [`ErrorKind::exit_code()`].

use thiserror::Error;

use crate::digest::ContentDigest;
use crate::identity::{Branch, Category, Revision};

/// Classification of a [`PipelineError`], used for retry decisions and
/// process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Requested revision, artifact, or marker does not exist.
    NotFound,
    /// A publish would overwrite differing content at an immutable location.
    Conflict,
    /// Two independent builds disagree and the policy treats that as blocking.
    DeterminismMismatch,
    /// Network or storage failure; the whole stage may be retried.
    TransientIo,
    /// A marker advance would move to an older or unrelated revision.
    AncestryViolation,
    /// Stored bytes do not match their recorded digest.
    Integrity,
    /// Malformed input (identifier, manifest, missing input file).
    Invalid,
    /// Signing or signature verification failure.
    Crypto,
}

impl ErrorKind {
    /// Process exit code for this error kind.
    ///
    /// `0` is reserved for success and `1` for failures outside the
    /// taxonomy (argument parsing, unexpected I/O in the CLI glue).
    pub fn exit_code(self) -> u8 {
        match self {
            Self::NotFound => 2,
            Self::Conflict => 3,
            Self::TransientIo => 4,
            Self::AncestryViolation => 5,
            Self::DeterminismMismatch => 6,
            Self::Integrity => 7,
            Self::Invalid => 8,
            Self::Crypto => 9,
        }
    }

    /// Whether a stage failing with this kind may be re-run from scratch.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientIo)
    }
}

/// Top-level error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Requested object is absent (or absent within the look-back window).
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    /// Publishing would change bytes at an already-published location.
    #[error("conflict at {location}: published digest {existing}, attempted {attempted}")]
    Conflict {
        /// The `<category>/<revision>/<name>` key.
        location: String,
        /// Digest of the bytes already stored.
        existing: ContentDigest,
        /// Digest of the bytes the caller tried to store.
        attempted: ContentDigest,
    },

    /// Independent builds of one revision produced different manifests.
    #[error("determinism mismatch for {category}/{revision}: {}", .mismatched.join(", "))]
    DeterminismMismatch {
        /// The revision that was built twice.
        revision: Revision,
        /// The artifact category that was compared.
        category: Category,
        /// Names that were missing, extra, or differed.
        mismatched: Vec<String>,
    },

    /// Storage or network failure. Safe to retry the whole stage.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Marker advance refused because the target is not a descendant.
    #[error("ancestry violation on branch {branch}: stored {current} is not an ancestor of {attempted}")]
    AncestryViolation {
        /// The branch whose marker was being advanced.
        branch: Branch,
        /// The revision currently stored.
        current: Revision,
        /// The revision the caller tried to store.
        attempted: Revision,
    },

    /// Stored or downloaded bytes do not hash to the recorded digest.
    #[error("integrity violation at {location}: expected {expected}, got {actual}")]
    Integrity {
        /// Where the bytes came from.
        location: String,
        /// Digest recorded in the manifest.
        expected: ContentDigest,
        /// Digest of the bytes actually read.
        actual: ContentDigest,
    },

    /// An identifier or manifest failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A required local input is missing.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Signing or verification failed.
    #[error("cryptographic error: {0}")]
    Crypto(String),
}

impl PipelineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::DeterminismMismatch { .. } => ErrorKind::DeterminismMismatch,
            Self::TransientIo(_) => ErrorKind::TransientIo,
            Self::AncestryViolation { .. } => ErrorKind::AncestryViolation,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Validation(_) | Self::MissingInput(_) => ErrorKind::Invalid,
            Self::Crypto(_) => ErrorKind::Crypto,
        }
    }

    /// Shorthand for a [`PipelineError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Wrap an I/O error with context, classifying `NotFound` separately
    /// from transient failures.
    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                what: format!("{context}: {err}"),
            },
            _ => Self::TransientIo(format!("{context}: {err}")),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O", err)
    }
}

/// Validation failures for domain identifiers and manifest text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Revision is not 6-64 lowercase hex characters.
    #[error("invalid revision: \"{0}\" (expected 6-64 hex characters)")]
    InvalidRevision(String),

    /// Category does not match `^[a-z0-9][a-z0-9-]{0,63}$`.
    #[error("invalid category: \"{0}\" (expected [a-z0-9][a-z0-9-]{{0,63}})")]
    InvalidCategory(String),

    /// Build variant does not match `^[a-z0-9][a-z0-9-]{0,63}$`.
    #[error("invalid build variant: \"{0}\"")]
    InvalidVariant(String),

    /// Marker tag does not match `^[a-z0-9][a-z0-9-]{0,63}$`.
    #[error("invalid marker tag: \"{0}\"")]
    InvalidTag(String),

    /// Artifact name is empty, too long, or contains a path separator.
    #[error("invalid artifact name: \"{0}\"")]
    InvalidArtifactName(String),

    /// Artifact name collides with the manifest or a signature file.
    #[error("reserved artifact name: \"{0}\"")]
    ReservedArtifactName(String),

    /// Branch name is not a usable ref name.
    #[error("invalid branch: \"{0}\"")]
    InvalidBranch(String),

    /// Digest is not 64 hex characters.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// A manifest line could not be parsed.
    #[error("manifest line {line}: {reason}")]
    ManifestParse {
        /// 1-based line number.
        line: usize,
        /// Why the line was rejected.
        reason: String,
    },

    /// The same name appears twice in one manifest.
    #[error("duplicate manifest entry: \"{0}\"")]
    DuplicateManifestEntry(String),

    /// Remote location key is not `<category>/<revision>/<name>`.
    #[error("invalid remote location: \"{0}\"")]
    InvalidLocation(String),

    /// A stored promotion marker could not be decoded.
    #[error("malformed promotion marker at {key}: {reason}")]
    MalformedMarker {
        /// Store key of the marker.
        key: String,
        /// Decoder message.
        reason: String,
    },
}
