//! # Identity Newtypes
//!
//! Domain-primitive newtypes for everything that keys an artifact lookup.
//! Each identifier is a distinct type: a [`Category`] cannot be passed
//! where a [`BuildVariant`] is expected, and a [`Revision`] is never a bare
//! string.
//!
//! ## Validation
//!
//! All identifiers validate at construction and at deserialization, so a
//! value that exists is always well-formed. Inputs are trimmed; revisions,
//! categories, variants and tags are lowercased before validation.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::manifest::{MANIFEST_FILE_NAME, SIGNATURE_SUFFIX};

/// Validate a slug (`^[a-z0-9][a-z0-9-]{0,63}$`) after trimming and
/// lowercasing. Shared by categories, build variants and marker tags.
fn validate_slug(raw: &str) -> Option<String> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() || s.len() > 64 {
        return None;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return None,
    }
    if chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        Some(s)
    } else {
        None
    }
}

macro_rules! string_newtype_common {
    ($name:ident) => {
        impl $name {
            /// Access the validated string value.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// An immutable source-control commit identifier.
///
/// 6 to 64 lowercase hex characters, covering abbreviated ids and full
/// SHA-1 or SHA-256 object names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Create a revision, validating the hex format.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRevision`] for anything that is
    /// not 6-64 hex characters.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let s = value.as_ref().trim().to_lowercase();
        if !(6..=64).contains(&s.len()) || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidRevision(value.as_ref().to_string()));
        }
        Ok(Self(s))
    }

    /// First `n` characters, for log lines.
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }
}

string_newtype_common!(Revision);

// ---------------------------------------------------------------------------
// Slug-shaped identifiers
// ---------------------------------------------------------------------------

/// An artifact category: the first segment of a remote location
/// (`release`, `canisters`, `guest-os`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Node binaries and release tarballs.
    pub const RELEASE: &'static str = "release";
    /// Compiled canister modules.
    pub const CANISTERS: &'static str = "canisters";
    /// Guest OS disk and update images.
    pub const GUEST_OS: &'static str = "guest-os";

    /// Create a category, validating `^[a-z0-9][a-z0-9-]{0,63}$`.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_slug(value.as_ref())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidCategory(value.as_ref().to_string()))
    }

    /// The `release` category.
    pub fn release() -> Self {
        Self(Self::RELEASE.to_string())
    }

    /// The `canisters` category.
    pub fn canisters() -> Self {
        Self(Self::CANISTERS.to_string())
    }

    /// The `guest-os` category.
    pub fn guest_os() -> Self {
        Self(Self::GUEST_OS.to_string())
    }
}

string_newtype_common!(Category);

/// Distinguishes independent builds of the same revision (e.g. `native`
/// vs `container`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildVariant(String);

impl BuildVariant {
    /// Build on the host toolchain.
    pub const NATIVE: &'static str = "native";
    /// Build inside the reproducible-build container.
    pub const CONTAINER: &'static str = "container";

    pub fn native() -> Self {
        Self(Self::NATIVE.to_string())
    }

    pub fn container() -> Self {
        Self(Self::CONTAINER.to_string())
    }

    /// Create a build variant, validating `^[a-z0-9][a-z0-9-]{0,63}$`.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_slug(value.as_ref())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidVariant(value.as_ref().to_string()))
    }
}

string_newtype_common!(BuildVariant);

/// Second key of a promotion marker, naming what succeeded
/// (`build-ok`, `tests-ok`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarkerTag(String);

impl MarkerTag {
    /// Tag used when the caller does not name one.
    pub const DEFAULT: &'static str = "build-ok";

    /// Create a marker tag, validating `^[a-z0-9][a-z0-9-]{0,63}$`.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_slug(value.as_ref())
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTag(value.as_ref().to_string()))
    }
}

impl Default for MarkerTag {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

string_newtype_common!(MarkerTag);

// ---------------------------------------------------------------------------
// ArtifactName
// ---------------------------------------------------------------------------

/// The file name of one artifact within a set (`replica`,
/// `update-img.zip`, ...).
///
/// # Validation
///
/// - 1 to 255 characters from `[A-Za-z0-9._+-]`
/// - Must not start with `.` (rules out `.`, `..` and hidden files)
///
/// Case is preserved. The manifest and signature names are syntactically
/// valid artifact names; [`ArtifactName::is_reserved()`] tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Create an artifact name, validating the file-name character set.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let s = value.as_ref().trim();
        let valid = !s.is_empty()
            && s.len() <= 255
            && !s.starts_with('.')
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
        if !valid {
            return Err(ValidationError::InvalidArtifactName(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Whether this is the manifest file or a detached signature, which
    /// travel with an artifact set but are never manifest entries.
    pub fn is_reserved(&self) -> bool {
        self.0 == MANIFEST_FILE_NAME || self.0.ends_with(SIGNATURE_SUFFIX)
    }

    /// The detached signature file name for this artifact.
    pub fn signature_name(&self) -> ArtifactName {
        Self(format!("{}{SIGNATURE_SUFFIX}", self.0))
    }
}

string_newtype_common!(ArtifactName);

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// A source-control branch name, first key of a promotion marker.
///
/// # Validation
///
/// Follows the practical subset of `git check-ref-format`: non-empty, at
/// most 255 bytes, no whitespace or control characters, no `..`, no
/// leading `-` or `/`, no trailing `/` or `.lock`, none of `~^:?*[\`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Branch(String);

impl Branch {
    /// Create a branch name, validating ref-name rules.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let s = value.as_ref().trim();
        let bad_char = |c: char| {
            c.is_whitespace() || c.is_control() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')
        };
        let valid = !s.is_empty()
            && s.len() <= 255
            && !s.contains("..")
            && !s.contains("//")
            && !s.starts_with('-')
            && !s.starts_with('/')
            && !s.ends_with('/')
            && !s.ends_with(".lock")
            && !s.chars().any(bad_char);
        if !valid {
            return Err(ValidationError::InvalidBranch(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Encode as a single store-key segment: `%` and `/` are
    /// percent-escaped so `release/rc-1` cannot collide with a nested key.
    pub fn key_segment(&self) -> String {
        self.0.replace('%', "%25").replace('/', "%2F")
    }
}

string_newtype_common!(Branch);
