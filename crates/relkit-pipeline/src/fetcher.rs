//! # Artifact Fetcher
//!
//! Downloads a published set (or a glob-selected part of it) into a local
//! directory.
//!
//! 1. The revision is given exactly or resolved as "latest" with
//!    [`resolve_revision()`].
//! 2. The published `SHA256SUMS` is read first. No manifest means the set
//!    is incomplete or absent: `NotFound`.
//! 3. Selected artifacts download concurrently (bounded by
//!    `concurrency`). Each is re-hashed against the manifest before it is
//!    written. The first failure aborts the rest.
//! 4. The manifest and any signature files are written next to the
//!    artifacts so the directory can be re-verified offline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use relkit_core::{
    sha256_digest, ArtifactName, Category, ContentDigest, HashManifest, PipelineError,
    RemoteLocation, Revision, ValidationError, MANIFEST_FILE_NAME,
};
use relkit_store::ObjectStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ancestry::AncestryOracle;
use crate::resolve::{complete_revisions, resolve_latest};
use crate::signer::manifest_signature_name;

/// How to pick the revision to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSelector {
    Exact(Revision),
    /// Newest complete revision at or below `from` in first-parent history.
    LatestFrom(Revision),
}

/// Turn a selector into a concrete revision.
pub fn resolve_revision(
    store: &dyn ObjectStore,
    category: &Category,
    selector: &RevisionSelector,
    oracle: &dyn AncestryOracle,
    window: usize,
) -> Result<Revision, PipelineError> {
    match selector {
        RevisionSelector::Exact(rev) => Ok(rev.clone()),
        RevisionSelector::LatestFrom(from) => {
            let complete = complete_revisions(store, category)?;
            resolve_latest(oracle, &complete, category, from, window)
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub category: Category,
    pub revision: Revision,
    /// Name globs; empty selects everything.
    pub include: Vec<String>,
    pub out_dir: PathBuf,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub name: ArtifactName,
    pub path: PathBuf,
    pub digest: ContentDigest,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub revision: Revision,
    /// Downloaded artifacts in name order.
    pub files: Vec<FetchedFile>,
}

/// Downloads artifact sets from an [`ObjectStore`].
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn ObjectStore>,
}

impl Fetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Download the artifacts selected by `request`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the set has no manifest or the globs select nothing.
    /// `Integrity` if downloaded bytes do not match the manifest.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchReport, PipelineError> {
        let filter = build_filter(&request.include)?;
        let manifest_loc = location(request, MANIFEST_FILE_NAME)?;
        let manifest_bytes = self.get_blocking(manifest_loc.key()).await?.ok_or_else(|| {
            PipelineError::not_found(format!(
                "complete artifact set {}/{} (no {MANIFEST_FILE_NAME})",
                request.category, request.revision
            ))
        })?;
        let manifest_text =
            String::from_utf8(manifest_bytes).map_err(|_| ValidationError::ManifestParse {
                line: 1,
                reason: format!("{} is not UTF-8", manifest_loc.key()),
            })?;
        let manifest = HashManifest::parse(&manifest_text)?;

        let selected: Vec<(ArtifactName, ContentDigest)> = manifest
            .iter()
            .filter(|(name, _)| filter.as_ref().map_or(true, |f| f.is_match(name.as_str())))
            .map(|(n, d)| (n.clone(), *d))
            .collect();
        if selected.is_empty() {
            return Err(PipelineError::not_found(format!(
                "artifacts matching {:?} in {}/{}",
                request.include, request.category, request.revision
            )));
        }

        let out_dir = request.out_dir.clone();
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PipelineError::io(out_dir.display(), e))?;

        tracing::info!(
            category = %request.category,
            revision = %request.revision,
            artifacts = selected.len(),
            "fetching artifacts"
        );

        let semaphore = Arc::new(Semaphore::new(request.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (name, expected) in selected {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let key = location(request, name.as_str())?.key();
            let dest = out_dir.join(name.as_str());
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::TransientIo(format!("download pool closed: {e}")))?;
                let path = tokio::task::spawn_blocking(move || {
                    download_one(store.as_ref(), &key, expected, &dest)
                })
                .await
                .map_err(|e| PipelineError::TransientIo(format!("download task failed: {e}")))??;
                Ok::<_, PipelineError>(FetchedFile {
                    name,
                    path,
                    digest: expected,
                })
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| PipelineError::TransientIo(format!("download task failed: {e}")));
            match result.and_then(|r| r) {
                Ok(file) => {
                    tracing::debug!(artifact = %file.name, "downloaded");
                    files.push(file);
                }
                Err(e) => {
                    tracing::warn!(revision = %request.revision, error = %e, "fetch failed, aborting remaining downloads");
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        write_local(&out_dir.join(MANIFEST_FILE_NAME), manifest_text.as_bytes()).await?;
        self.fetch_signatures(request, &files).await?;

        Ok(FetchReport {
            revision: request.revision.clone(),
            files,
        })
    }

    async fn get_blocking(&self, key: String) -> Result<Option<Vec<u8>>, PipelineError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.get(&key).map_err(PipelineError::from))
            .await
            .map_err(|e| PipelineError::TransientIo(format!("store task failed: {e}")))?
    }

    /// Copy whichever signature files exist for the fetched artifacts.
    async fn fetch_signatures(
        &self,
        request: &FetchRequest,
        files: &[FetchedFile],
    ) -> Result<(), PipelineError> {
        let mut names = vec![manifest_signature_name()?];
        names.extend(files.iter().map(|f| f.name.signature_name()));
        for name in names {
            let key = location(request, name.as_str())?.key();
            if let Some(bytes) = self.get_blocking(key).await? {
                write_local(&request.out_dir.join(name.as_str()), &bytes).await?;
            }
        }
        Ok(())
    }
}

fn location(request: &FetchRequest, name: &str) -> Result<RemoteLocation, PipelineError> {
    Ok(RemoteLocation::new(
        request.category.clone(),
        request.revision.clone(),
        ArtifactName::new(name)?,
    ))
}

fn build_filter(include: &[String]) -> Result<Option<GlobSet>, PipelineError> {
    if include.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in include {
        let glob = Glob::new(pattern).map_err(|e| {
            PipelineError::MissingInput(format!("invalid include glob {pattern:?}: {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| PipelineError::MissingInput(format!("invalid include globs: {e}")))
}

fn download_one(
    store: &dyn ObjectStore,
    key: &str,
    expected: ContentDigest,
    dest: &Path,
) -> Result<PathBuf, PipelineError> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| PipelineError::not_found(format!("artifact {key}")))?;
    let actual = sha256_digest(&bytes);
    if actual != expected {
        return Err(PipelineError::Integrity {
            location: key.to_string(),
            expected,
            actual,
        });
    }
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    std::fs::write(&partial, &bytes).map_err(|e| PipelineError::io(partial.display(), e))?;
    std::fs::rename(&partial, dest).map_err(|e| PipelineError::io(dest.display(), e))?;
    Ok(dest.to_path_buf())
}

async fn write_local(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::io(path.display(), e))
}
