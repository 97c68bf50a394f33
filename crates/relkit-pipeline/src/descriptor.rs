//! # Release Descriptors
//!
//! Summarizes a published revision for deployment tooling: where to
//! download each node binary and the update package, and the SHA-256 each
//! must hash to.
//!
//! Binaries come from the `release` set, the package (`update-img.zip`)
//! from the `guest-os` set. An [`UpgradeContent`] selector restricts the
//! descriptor to one binary; unselected binaries are left empty.

use relkit_core::{
    ArtifactName, Category, ContentDigest, HashManifest, PipelineError, RemoteLocation, Revision,
    MANIFEST_FILE_NAME,
};
use relkit_store::ObjectStore;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::image::UPDATE_IMAGE;

pub const REPLICA_BINARY: &str = "replica";
pub const NODEMANAGER_BINARY: &str = "nodemanager";

/// Which binaries an upgrade carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeContent {
    #[default]
    All,
    Replica,
    Nodemanager,
}

impl UpgradeContent {
    fn includes_replica(self) -> bool {
        matches!(self, Self::All | Self::Replica)
    }

    fn includes_nodemanager(self) -> bool {
        matches!(self, Self::All | Self::Nodemanager)
    }
}

impl std::str::FromStr for UpgradeContent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "replica" => Ok(Self::Replica),
            "nodemanager" => Ok(Self::Nodemanager),
            other => Err(format!(
                "unknown upgrade content {other:?} (expected all, replica or nodemanager)"
            )),
        }
    }
}

/// Download location and expected digest of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
    pub url: Url,
    pub sha256: ContentDigest,
}

/// Where a revision's deployable files live and how to check them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// The version id, i.e. the revision.
    pub version: Revision,
    pub content: UpgradeContent,
    pub replica: Option<DownloadRef>,
    pub nodemanager: Option<DownloadRef>,
    /// `update-img.zip`, when a guest OS set is published.
    pub release_package: Option<DownloadRef>,
}

/// Build a descriptor from the published manifests of `revision`.
///
/// # Errors
///
/// `NotFound` if the release set is incomplete or lacks a selected
/// binary. `MissingInput` if `base_url` cannot anchor relative paths.
pub fn describe_release(
    store: &dyn ObjectStore,
    base_url: &Url,
    revision: &Revision,
    content: UpgradeContent,
) -> Result<ReleaseDescriptor, PipelineError> {
    let base = directory_url(base_url)?;
    let release = Category::release();
    let release_manifest = published_manifest(store, &release, revision)?.ok_or_else(|| {
        PipelineError::not_found(format!("complete release set for {revision}"))
    })?;

    let binary = |name: &str| -> Result<DownloadRef, PipelineError> {
        let name = ArtifactName::new(name)?;
        let digest = release_manifest
            .get(&name)
            .ok_or_else(|| PipelineError::not_found(format!("{name} in release/{revision}")))?;
        download_ref(&base, &release, revision, name.clone(), *digest)
    };
    let replica = content
        .includes_replica()
        .then(|| binary(REPLICA_BINARY))
        .transpose()?;
    let nodemanager = content
        .includes_nodemanager()
        .then(|| binary(NODEMANAGER_BINARY))
        .transpose()?;

    let guest_os = Category::guest_os();
    let package_name = ArtifactName::new(UPDATE_IMAGE)?;
    let release_package = match published_manifest(store, &guest_os, revision)? {
        Some(m) => match m.get(&package_name) {
            Some(digest) => Some(download_ref(&base, &guest_os, revision, package_name, *digest)?),
            None => None,
        },
        None => {
            tracing::debug!(%revision, "no guest-os set published, descriptor has no package");
            None
        }
    };

    Ok(ReleaseDescriptor {
        version: revision.clone(),
        content,
        replica,
        nodemanager,
        release_package,
    })
}

fn published_manifest(
    store: &dyn ObjectStore,
    category: &Category,
    revision: &Revision,
) -> Result<Option<HashManifest>, PipelineError> {
    let key = RemoteLocation::new(
        category.clone(),
        revision.clone(),
        ArtifactName::new(MANIFEST_FILE_NAME)?,
    )
    .key();
    let Some(bytes) = store.get(&key)? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(Some(HashManifest::parse(&text)?))
}

/// `base` with a trailing slash, so joins append instead of replacing
/// the last path segment.
fn directory_url(base: &Url) -> Result<Url, PipelineError> {
    if base.cannot_be_a_base() {
        return Err(PipelineError::MissingInput(format!(
            "download base URL {base} cannot have paths appended"
        )));
    }
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn download_ref(
    base: &Url,
    category: &Category,
    revision: &Revision,
    name: ArtifactName,
    sha256: ContentDigest,
) -> Result<DownloadRef, PipelineError> {
    let key = RemoteLocation::new(category.clone(), revision.clone(), name).key();
    let url = base
        .join(&key)
        .map_err(|e| PipelineError::MissingInput(format!("cannot build URL for {key}: {e}")))?;
    Ok(DownloadRef { url, sha256 })
}
