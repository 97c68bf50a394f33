//! In-memory [`ObjectStore`] for tests and dry runs.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{immutable_outcome, same_value, validate_key, CasOutcome, ObjectStore, PutOutcome};

/// A `BTreeMap` behind a mutex. Every operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Overwrite `key` unconditionally. Test hook for simulating
    /// corruption; the pipeline never calls this.
    pub fn overwrite(&self, key: &str, bytes: &[u8]) {
        self.objects.lock().insert(key.to_string(), bytes.to_vec());
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self.objects.lock().get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.lock();
        match objects.get(key) {
            Some(existing) => immutable_outcome(key, existing, bytes),
            None => {
                objects.insert(key.to_string(), bytes.to_vec());
                Ok(PutOutcome::Created)
            }
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.lock();
        let current = objects.get(key).map(Vec::as_slice);
        if !same_value(current, expected) {
            return Ok(CasOutcome::Stale {
                current: current.map(<[u8]>::to_vec),
            });
        }
        objects.insert(key.to_string(), new.to_vec());
        Ok(CasOutcome::Swapped)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.lock();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryObjectStore::new();
        assert_eq!(
            store.put_if_absent("release/abc123/replica", b"bin").unwrap(),
            PutOutcome::Created
        );
        assert_eq!(
            store.get("release/abc123/replica").unwrap().as_deref(),
            Some(&b"bin"[..])
        );
        assert!(store.get("release/abc123/missing").unwrap().is_none());
    }

    #[test]
    fn republish_identical_is_noop() {
        let store = MemoryObjectStore::new();
        store.put_if_absent("a/b", b"x").unwrap();
        assert_eq!(
            store.put_if_absent("a/b", b"x").unwrap(),
            PutOutcome::AlreadyIdentical
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn republish_different_conflicts_and_keeps_original() {
        let store = MemoryObjectStore::new();
        store.put_if_absent("a/b", b"x").unwrap();
        assert!(matches!(
            store.put_if_absent("a/b", b"y"),
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.get("a/b").unwrap().as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn list_is_prefix_scoped_and_sorted() {
        let store = MemoryObjectStore::new();
        for key in ["release/abc123/b", "release/abc123/a", "release/abc1234/a", "canisters/abc123/a"] {
            store.put_if_absent(key, b"").unwrap();
        }
        assert_eq!(
            store.list("release/abc123/").unwrap(),
            vec!["release/abc123/a", "release/abc123/b"]
        );
    }

    #[test]
    fn cas_create_then_update() {
        let store = MemoryObjectStore::new();
        assert_eq!(
            store.compare_and_swap("m/k", None, b"1").unwrap(),
            CasOutcome::Swapped
        );
        assert_eq!(
            store.compare_and_swap("m/k", None, b"2").unwrap(),
            CasOutcome::Stale {
                current: Some(b"1".to_vec())
            }
        );
        assert_eq!(
            store.compare_and_swap("m/k", Some(b"1"), b"2").unwrap(),
            CasOutcome::Swapped
        );
        assert_eq!(store.get("m/k").unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn concurrent_cas_has_one_winner() {
        let store = Arc::new(MemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .compare_and_swap("m/k", None, format!("{i}").as_bytes())
                        .unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == CasOutcome::Swapped)
            .count();
        assert_eq!(winners, 1);
    }
}
