//! # Signer
//!
//! Produces detached Ed25519 signatures for an artifact set.
//!
//! - [`SignatureMode::Manifest`] (default): one signature over the whole
//!   rendered manifest, stored as `SHA256SUMS.sig`.
//! - [`SignatureMode::PerArtifact`]: one signature per artifact, stored as
//!   `<artifact>.sig`, over a single-line manifest naming that artifact.
//!
//! Either way the signed bytes are a rendered [`HashManifest`], so a
//! signature is invalidated by any change to a digest or name. Signature
//! files hold the 128-char hex signature and a newline.
//!
//! Signing only verified sets is the driver's job; nothing here checks it.

use std::path::Path;

use relkit_core::{
    ArtifactName, ContentDigest, HashManifest, PipelineError, MANIFEST_FILE_NAME,
};
use relkit_crypto::{Ed25519Signature, KeyProvider, VerifyingKey};

use crate::artifact_set::LocalArtifactSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    #[default]
    Manifest,
    PerArtifact,
}

/// A detached signature and the file name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFile {
    pub name: ArtifactName,
    pub signature: Ed25519Signature,
}

impl SignatureFile {
    /// On-disk form: hex and a trailing newline.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\n", self.signature.to_hex()).into_bytes()
    }

    /// Parse the on-disk form.
    pub fn parse(name: ArtifactName, bytes: &[u8]) -> Result<Self, PipelineError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PipelineError::Crypto(format!("{name}: signature is not UTF-8")))?;
        let signature = Ed25519Signature::from_hex(text)?;
        Ok(Self { name, signature })
    }
}

/// Name of the whole-manifest signature file (`SHA256SUMS.sig`).
pub fn manifest_signature_name() -> Result<ArtifactName, PipelineError> {
    Ok(ArtifactName::new(MANIFEST_FILE_NAME)?.signature_name())
}

/// The manifest a per-artifact signature covers.
pub fn single_entry_manifest(
    name: &ArtifactName,
    digest: ContentDigest,
) -> Result<HashManifest, PipelineError> {
    let mut m = HashManifest::new();
    m.insert(name.clone(), digest)?;
    Ok(m)
}

/// Sign `manifest` with `provider`.
pub fn sign_manifest(
    provider: &dyn KeyProvider,
    manifest: &HashManifest,
    mode: SignatureMode,
) -> Result<Vec<SignatureFile>, PipelineError> {
    let files = match mode {
        SignatureMode::Manifest => vec![SignatureFile {
            name: manifest_signature_name()?,
            signature: provider.sign(&manifest.canonical_bytes())?,
        }],
        SignatureMode::PerArtifact => manifest
            .iter()
            .map(|(name, digest)| -> Result<SignatureFile, PipelineError> {
                let single = single_entry_manifest(name, *digest)?;
                Ok(SignatureFile {
                    name: name.signature_name(),
                    signature: provider.sign(&single.canonical_bytes())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    tracing::info!(
        provider = provider.provider_name(),
        ?mode,
        artifacts = manifest.len(),
        signatures = files.len(),
        "signed artifact set"
    );
    Ok(files)
}

/// Sign the files in `dir` and write `SHA256SUMS` plus signature files
/// next to them.
pub fn sign_directory(
    dir: &Path,
    provider: &dyn KeyProvider,
    mode: SignatureMode,
) -> Result<Vec<SignatureFile>, PipelineError> {
    let set = LocalArtifactSet::scan(dir)?;
    let files = sign_manifest(provider, set.manifest(), mode)?;
    set.write_manifest()?;
    for file in &files {
        let path = set.path_of(&file.name);
        std::fs::write(&path, file.to_bytes()).map_err(|e| PipelineError::io(path.display(), e))?;
    }
    Ok(files)
}

/// Collect whatever signature files exist in `set`'s directory for its
/// manifest: `SHA256SUMS.sig` if present, else `<name>.sig` per artifact.
pub fn read_signatures(set: &LocalArtifactSet) -> Result<Vec<SignatureFile>, PipelineError> {
    let manifest_sig = manifest_signature_name()?;
    let path = set.path_of(&manifest_sig);
    if path.is_file() {
        let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(path.display(), e))?;
        return Ok(vec![SignatureFile::parse(manifest_sig, &bytes)?]);
    }
    let mut files = Vec::new();
    for name in set.manifest().names() {
        let sig_name = name.signature_name();
        let path = set.path_of(&sig_name);
        if path.is_file() {
            let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(path.display(), e))?;
            files.push(SignatureFile::parse(sig_name, &bytes)?);
        }
    }
    Ok(files)
}

/// Check `signatures` against `manifest`.
///
/// A manifest signature must verify over the full manifest. Otherwise
/// every artifact must carry a valid per-artifact signature.
pub fn verify_signatures(
    manifest: &HashManifest,
    signatures: &[SignatureFile],
    key: &VerifyingKey,
) -> Result<SignatureMode, PipelineError> {
    let manifest_sig = manifest_signature_name()?;
    if let Some(file) = signatures.iter().find(|f| f.name == manifest_sig) {
        key.verify(&manifest.canonical_bytes(), &file.signature)?;
        return Ok(SignatureMode::Manifest);
    }
    if signatures.is_empty() {
        return Err(PipelineError::Crypto("no signatures found".to_string()));
    }
    for (name, digest) in manifest.iter() {
        let sig_name = name.signature_name();
        let file = signatures
            .iter()
            .find(|f| f.name == sig_name)
            .ok_or_else(|| PipelineError::Crypto(format!("{name}: missing signature")))?;
        let single = single_entry_manifest(name, *digest)?;
        key.verify(&single.canonical_bytes(), &file.signature)
            .map_err(|e| PipelineError::Crypto(format!("{name}: {e}")))?;
    }
    Ok(SignatureMode::PerArtifact)
}

/// Re-hash `dir`, compare against its `SHA256SUMS`, and verify its
/// signatures with `key`.
pub fn verify_directory(dir: &Path, key: &VerifyingKey) -> Result<SignatureMode, PipelineError> {
    let set = LocalArtifactSet::scan(dir)?;
    let recorded = crate::artifact_set::load_manifest(&dir.join(MANIFEST_FILE_NAME))?;
    check_recorded_manifest(&set, &recorded)?;
    let signatures = read_signatures(&set)?;
    verify_signatures(&recorded, &signatures, key)
}

/// Fail with `Integrity` if a file's digest disagrees with `recorded`, or
/// `NotFound` if a recorded file is absent.
pub fn check_recorded_manifest(
    set: &LocalArtifactSet,
    recorded: &HashManifest,
) -> Result<(), PipelineError> {
    for (name, expected) in recorded.iter() {
        match set.manifest().get(name) {
            None => {
                return Err(PipelineError::not_found(format!(
                    "{} listed in {MANIFEST_FILE_NAME}",
                    set.path_of(name).display()
                )))
            }
            Some(actual) if actual != expected => {
                return Err(PipelineError::Integrity {
                    location: set.path_of(name).display().to_string(),
                    expected: *expected,
                    actual: *actual,
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
