//! # Local Artifact Sets
//!
//! A build leaves its outputs as regular files in one directory. A
//! [`LocalArtifactSet`] is that directory plus the [`HashManifest`] of its
//! top-level files. The manifest file and signatures are never entries.

use std::path::{Path, PathBuf};

use relkit_core::{ArtifactName, HashManifest, PipelineError, MANIFEST_FILE_NAME};
use relkit_crypto::sha256_file;
use walkdir::WalkDir;

/// An artifact directory and the digests of its files.
#[derive(Debug, Clone)]
pub struct LocalArtifactSet {
    root: PathBuf,
    manifest: HashManifest,
}

impl LocalArtifactSet {
    /// Hash every regular top-level file in `dir`.
    ///
    /// Hidden files are ignored. Subdirectories are not descended into.
    /// Symlinks are skipped with a warning.
    ///
    /// # Errors
    ///
    /// `NotFound` if `dir` does not exist, a validation error for a file
    /// whose name is not a valid artifact name.
    pub fn scan(dir: &Path) -> Result<Self, PipelineError> {
        if !dir.is_dir() {
            return Err(PipelineError::not_found(format!(
                "artifact directory {}",
                dir.display()
            )));
        }
        let mut manifest = HashManifest::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                PipelineError::TransientIo(format!("scanning {}: {e}", dir.display()))
            })?;
            if entry.file_type().is_symlink() {
                tracing::warn!(path = %entry.path().display(), "skipping symlink in artifact directory");
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if file_name.starts_with('.') {
                tracing::debug!(file = %file_name, "skipping hidden file");
                continue;
            }
            let name = ArtifactName::new(&*file_name)?;
            if name.is_reserved() {
                continue;
            }
            let digest = sha256_file(entry.path())?;
            manifest.insert(name, digest)?;
        }
        tracing::debug!(dir = %dir.display(), artifacts = manifest.len(), "scanned artifact set");
        Ok(Self {
            root: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &HashManifest {
        &self.manifest
    }

    /// Local path of an artifact (or reserved file) in the set.
    pub fn path_of(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Read one artifact's bytes.
    pub fn read(&self, name: &ArtifactName) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_of(name);
        std::fs::read(&path).map_err(|e| PipelineError::io(path.display(), e))
    }

    /// Write the manifest as `SHA256SUMS` in the set directory.
    pub fn write_manifest(&self) -> Result<PathBuf, PipelineError> {
        let path = self.root.join(MANIFEST_FILE_NAME);
        std::fs::write(&path, self.manifest.render())
            .map_err(|e| PipelineError::io(path.display(), e))?;
        Ok(path)
    }
}

/// Load a manifest from a `SHA256SUMS` file, or hash a directory if
/// `path` is one.
pub fn load_manifest(path: &Path) -> Result<HashManifest, PipelineError> {
    if path.is_dir() {
        return Ok(LocalArtifactSet::scan(path)?.manifest);
    }
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path.display(), e))?;
    Ok(HashManifest::parse(&text)?)
}
