//! # Remote Locations
//!
//! Every published artifact lives at `<category>/<revision>/<artifact-name>`
//! in the object store. [`RemoteLocation`] is the typed form of that key;
//! [`set_prefix()`] gives the directory-like prefix of a whole set.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{ArtifactName, Category, Revision};

/// The store key of one published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteLocation {
    /// First path segment (`release`, `canisters`, `guest-os`, ...).
    pub category: Category,
    /// The commit the artifact was built from.
    pub revision: Revision,
    /// File name within the set.
    pub name: ArtifactName,
}

impl RemoteLocation {
    /// Construct a location from its parts.
    pub fn new(category: Category, revision: Revision, name: ArtifactName) -> Self {
        Self {
            category,
            revision,
            name,
        }
    }

    /// The `<category>/<revision>/<name>` key.
    pub fn key(&self) -> String {
        format!("{}{}", set_prefix(&self.category, &self.revision), self.name)
    }

    /// Parse a `<category>/<revision>/<name>` key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidLocation`] if the key does not have
    /// exactly three segments, or the segment's own validation error.
    pub fn parse(key: &str) -> Result<Self, ValidationError> {
        let mut parts = key.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(r), Some(n), None) => Ok(Self {
                category: Category::new(c)?,
                revision: Revision::new(r)?,
                name: ArtifactName::new(n)?,
            }),
            _ => Err(ValidationError::InvalidLocation(key.to_string())),
        }
    }
}

impl std::fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Key prefix shared by every artifact of one set: `<category>/<revision>/`.
pub fn set_prefix(category: &Category, revision: &Revision) -> String {
    format!("{category}/{revision}/")
}
