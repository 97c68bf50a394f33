//! # The `ObjectStore` Trait
//!
//! Release sets and promotion markers share one flat key space of
//! `/`-separated keys. Two write disciplines coexist:
//!
//! - **Immutable objects** (artifacts, signatures, manifests) are written
//!   with [`ObjectStore::put_if_absent()`]. A second write of identical
//!   bytes is a no-op; a write of different bytes is a
//!   [`StoreError::Conflict`]. Bytes at a key never change once visible.
//! - **Mutable markers** are updated with
//!   [`ObjectStore::compare_and_swap()`], which only succeeds if the
//!   stored value still equals what the caller last read.
//!
//! Readers never observe a partially written object.

use relkit_core::sha256_digest;
use subtle::ConstantTimeEq;

use crate::error::StoreError;

/// Result of a successful [`ObjectStore::put_if_absent()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was absent and now holds the bytes.
    Created,
    /// The key already held byte-identical content.
    AlreadyIdentical,
}

/// Result of an [`ObjectStore::compare_and_swap()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored value matched `expected` and was replaced.
    Swapped,
    /// Another writer got there first; `current` is what is stored now.
    Stale { current: Option<Vec<u8>> },
}

/// Storage backend for published release sets and promotion markers.
pub trait ObjectStore: Send + Sync {
    /// Read the object at `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` at `key` unless it already exists.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if `key` holds different bytes.
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError>;

    /// Replace the value at `key` with `new` if it currently equals
    /// `expected` (`None` meaning absent).
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, StoreError>;

    /// All keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Whether `key` exists.
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Check that `key` is a relative `/`-separated path with no empty, `.`,
/// `..` or hidden segments.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.contains('\\')
        && !key.contains('\0')
        && key.split('/').all(|seg| !seg.is_empty() && !seg.starts_with('.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Decide the outcome of writing `attempted` over `existing` at an
/// immutable key.
pub(crate) fn immutable_outcome(
    key: &str,
    existing: &[u8],
    attempted: &[u8],
) -> Result<PutOutcome, StoreError> {
    let existing = sha256_digest(existing);
    let attempted = sha256_digest(attempted);
    if bool::from(existing.as_bytes().ct_eq(attempted.as_bytes())) {
        Ok(PutOutcome::AlreadyIdentical)
    } else {
        Err(StoreError::Conflict {
            key: key.to_string(),
            existing,
            attempted,
        })
    }
}

pub(crate) fn same_value(current: Option<&[u8]>, expected: Option<&[u8]>) -> bool {
    match (current, expected) {
        (None, None) => true,
        (Some(a), Some(b)) => a.len() == b.len() && bool::from(a.ct_eq(b)),
        _ => false,
    }
}
