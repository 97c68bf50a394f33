//! # Filesystem Object Store
//!
//! Objects live at `{root}/{key}`. Two hidden directories under the root
//! hold bookkeeping and are never listed:
//!
//! - `.tmp/`: staging files. Every write lands here first.
//! - `.locks/`: one lock file per marker key. The files persist; only
//!   the advisory lock on them is taken and released.
//!
//! ## Atomicity
//!
//! - `put_if_absent` stages the full content, then `hard_link`s it into
//!   place. `link(2)` fails with `EEXIST` if the key exists, so
//!   create-if-absent is atomic and readers only ever see complete files.
//! - `compare_and_swap` takes an exclusive `flock` on the key's lock
//!   file, checks the current value, and `rename`s the staged file over
//!   the target. The kernel drops the lock when the holder exits, so a
//!   crashed writer never wedges the key.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fs4::FileExt;
use relkit_core::sha256_digest;
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::{immutable_outcome, same_value, validate_key, CasOutcome, ObjectStore, PutOutcome};

const TMP_DIR: &str = ".tmp";
const LOCK_DIR: &str = ".locks";
const LOCK_ATTEMPTS: u32 = 400;
const LOCK_BACKOFF: Duration = Duration::from_millis(5);

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// [`ObjectStore`] rooted at a local (or network-mounted) directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |p, seg| p.join(seg))
    }

    /// Write `bytes` to a fresh staging file and return its path.
    fn stage(&self, key: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(TMP_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(key, e))?;
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{n}", std::process::id()));
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StoreError::io(key, e))?;
        f.write_all(bytes).map_err(|e| StoreError::io(key, e))?;
        f.sync_all().map_err(|e| StoreError::io(key, e))?;
        Ok(path)
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join(LOCK_DIR).join(sha256_digest(key.as_bytes()).to_hex())
    }

    fn lock(&self, key: &str) -> Result<LockGuard, StoreError> {
        let path = self.lock_path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(key, e))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::io(key, e))?;
        for _ in 0..LOCK_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { _file: file }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(LOCK_BACKOFF);
                }
                Err(e) => return Err(StoreError::io(key, e)),
            }
        }
        tracing::warn!(key, lock = %path.display(), "lock held too long");
        Err(StoreError::LockTimeout(key.to_string()))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.object_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn ensure_parent(&self, key: &str, target: &Path) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(key, e))?;
        }
        Ok(())
    }
}

/// Holds the advisory lock until dropped; closing the file releases it.
struct LockGuard {
    _file: fs::File,
}

impl ObjectStore for FsObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        self.read(key)
    }

    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let target = self.object_path(key);
        if let Some(existing) = self.read(key)? {
            return immutable_outcome(key, &existing, bytes);
        }
        self.ensure_parent(key, &target)?;
        let staged = self.stage(key, bytes)?;
        let linked = fs::hard_link(&staged, &target);
        let _ = fs::remove_file(&staged);
        match linked {
            Ok(()) => {
                tracing::debug!(key, bytes = bytes.len(), "object created");
                Ok(PutOutcome::Created)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = self
                    .read(key)?
                    .ok_or_else(|| StoreError::io(key, e))?;
                immutable_outcome(key, &existing, bytes)
            }
            Err(e) => Err(StoreError::io(key, e)),
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<CasOutcome, StoreError> {
        validate_key(key)?;
        let target = self.object_path(key);
        let _guard = self.lock(key)?;
        let current = self.read(key)?;
        if !same_value(current.as_deref(), expected) {
            return Ok(CasOutcome::Stale { current });
        }
        self.ensure_parent(key, &target)?;
        let staged = self.stage(key, new)?;
        if let Err(e) = fs::rename(&staged, &target) {
            let _ = fs::remove_file(&staged);
            return Err(StoreError::io(key, e));
        }
        Ok(CasOutcome::Swapped)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Walk only the deepest directory the prefix names in full.
        let base = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if base.is_empty() {
            self.root.clone()
        } else {
            validate_key(base)?;
            self.object_path(base)
        };
        if !start.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let walker = WalkDir::new(&start)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| {
                StoreError::io(prefix, std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
