//! # Artifact Publisher
//!
//! Uploads a verified, signed artifact set to
//! `<category>/<revision>/<name>` in write order:
//!
//! 1. every artifact,
//! 2. the signature file(s),
//! 3. `SHA256SUMS`, whose presence marks the set complete,
//! 4. optionally, the promotion marker for the triggering branch.
//!
//! Before the first write the signatures are checked against the set's
//! manifest and every target key is read back. An invalid signature or an
//! existing object with different bytes fails the publish with nothing
//! written. Each write is then create-if-absent: identical bytes already
//! present are a no-op, and a conflicting writer racing past the check
//! still fails with `Conflict`. A crashed publish can be re-run with the
//! same inputs and picks up where it stopped. Readers never treat a set as
//! complete before its manifest lands.

use relkit_core::{
    sha256_digest, ArtifactName, Branch, Category, ContentDigest, MarkerTag, PipelineError,
    RemoteLocation, Revision, MANIFEST_FILE_NAME,
};
use relkit_crypto::VerifyingKey;
use relkit_store::{ObjectStore, PutOutcome};
use serde::Serialize;

use crate::ancestry::AncestryOracle;
use crate::artifact_set::LocalArtifactSet;
use crate::promotion::{AdvanceOutcome, PromotionTracker};
use crate::signer::{verify_signatures, SignatureFile};

/// What to publish and where.
pub struct PublishRequest<'a> {
    pub category: Category,
    pub revision: Revision,
    pub set: &'a LocalArtifactSet,
    pub signatures: &'a [SignatureFile],
    /// Key the signatures must verify under.
    pub verifying_key: &'a VerifyingKey,
}

/// Which marker to advance after a successful upload.
pub struct PromotionRequest<'a> {
    pub branch: Branch,
    pub tag: MarkerTag,
    pub oracle: &'a dyn AncestryOracle,
}

/// Result of the marker step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromotionStatus {
    NotRequested,
    Created,
    Advanced { from: Revision },
    Unchanged,
    /// The marker points at a revision that does not precede this one.
    Rejected { current: Revision },
}

impl From<AdvanceOutcome> for PromotionStatus {
    fn from(outcome: AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Created => Self::Created,
            AdvanceOutcome::Advanced { from } | AdvanceOutcome::Forced { from } => {
                Self::Advanced { from }
            }
            AdvanceOutcome::Unchanged => Self::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Every object written or confirmed, in write order.
    pub locations: Vec<String>,
    pub created: usize,
    pub already_present: usize,
    pub promotion: PromotionStatus,
}

pub struct Publisher<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Upload the set, then advance the marker if `promotion` is given.
    ///
    /// # Errors
    ///
    /// - `Crypto` if `signatures` is empty or does not verify over the
    ///   set's manifest. Nothing is written.
    /// - `Conflict` if any target key already holds different bytes.
    ///   Nothing is written when the check sees it; a writer that races
    ///   past the check leaves earlier objects but never the manifest.
    /// - `Integrity` if a local file changed since it was hashed.
    ///
    /// A rejected marker advance is not an error: it is logged and
    /// reported as [`PromotionStatus::Rejected`].
    pub fn publish(
        &self,
        request: &PublishRequest<'_>,
        promotion: Option<&PromotionRequest<'_>>,
    ) -> Result<PublishReport, PipelineError> {
        if request.signatures.is_empty() {
            return Err(PipelineError::Crypto(format!(
                "refusing to publish unsigned set {}/{}",
                request.category, request.revision
            )));
        }
        verify_signatures(request.set.manifest(), request.signatures, request.verifying_key)?;
        let manifest_name = ArtifactName::new(MANIFEST_FILE_NAME)?;
        let manifest_text = request.set.manifest().render();
        self.check_existing(request, &manifest_name, manifest_text.as_bytes())?;

        let mut report = PublishReport {
            locations: Vec::new(),
            created: 0,
            already_present: 0,
            promotion: PromotionStatus::NotRequested,
        };

        for (name, expected) in request.set.manifest().iter() {
            let bytes = request.set.read(name)?;
            let actual = sha256_digest(&bytes);
            if actual != *expected {
                return Err(PipelineError::Integrity {
                    location: request.set.path_of(name).display().to_string(),
                    expected: *expected,
                    actual,
                });
            }
            self.put(request, name.clone(), &bytes, &mut report)?;
        }
        for sig in request.signatures {
            self.put(request, sig.name.clone(), &sig.to_bytes(), &mut report)?;
        }
        self.put(request, manifest_name, manifest_text.as_bytes(), &mut report)?;
        tracing::info!(
            category = %request.category,
            revision = %request.revision,
            created = report.created,
            already_present = report.already_present,
            "artifact set published"
        );

        if let Some(p) = promotion {
            let tracker = PromotionTracker::new(self.store);
            report.promotion = match tracker.advance(&p.branch, &p.tag, &request.revision, false, p.oracle) {
                Ok(outcome) => outcome.into(),
                Err(PipelineError::AncestryViolation { current, .. }) => {
                    tracing::warn!(
                        branch = %p.branch,
                        tag = %p.tag,
                        revision = %request.revision,
                        %current,
                        "published but marker not advanced"
                    );
                    PromotionStatus::Rejected { current }
                }
                Err(e) => return Err(e),
            };
        }
        Ok(report)
    }

    fn key_of(request: &PublishRequest<'_>, name: &ArtifactName) -> String {
        RemoteLocation::new(request.category.clone(), request.revision.clone(), name.clone()).key()
    }

    /// Fail with `Conflict` if `name` is already published with a
    /// different digest.
    fn check_digest(
        &self,
        request: &PublishRequest<'_>,
        name: &ArtifactName,
        attempted: ContentDigest,
    ) -> Result<(), PipelineError> {
        let location = Self::key_of(request, name);
        match self.store.get(&location)? {
            Some(stored) => {
                let existing = sha256_digest(&stored);
                if existing == attempted {
                    Ok(())
                } else {
                    tracing::warn!(key = %location, "already published with different bytes");
                    Err(PipelineError::Conflict {
                        location,
                        existing,
                        attempted,
                    })
                }
            }
            None => Ok(()),
        }
    }

    /// Compare every object the publish would write with what is stored.
    fn check_existing(
        &self,
        request: &PublishRequest<'_>,
        manifest_name: &ArtifactName,
        manifest_bytes: &[u8],
    ) -> Result<(), PipelineError> {
        self.check_digest(request, manifest_name, sha256_digest(manifest_bytes))?;
        for (name, digest) in request.set.manifest().iter() {
            self.check_digest(request, name, *digest)?;
        }
        for sig in request.signatures {
            self.check_digest(request, &sig.name, sha256_digest(&sig.to_bytes()))?;
        }
        Ok(())
    }

    fn put(
        &self,
        request: &PublishRequest<'_>,
        name: ArtifactName,
        bytes: &[u8],
        report: &mut PublishReport,
    ) -> Result<(), PipelineError> {
        let location = RemoteLocation::new(request.category.clone(), request.revision.clone(), name);
        let key = location.key();
        match self.store.put_if_absent(&key, bytes)? {
            PutOutcome::Created => {
                tracing::debug!(artifact = %location.name, key, "uploaded");
                report.created += 1;
            }
            PutOutcome::AlreadyIdentical => {
                tracing::debug!(artifact = %location.name, key, "already present");
                report.already_present += 1;
            }
        }
        report.locations.push(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestry::LinearHistory;
    use crate::signer::{sign_manifest, SignatureMode};
    use relkit_core::ErrorKind;
    use relkit_crypto::{KeyProvider, LocalKeyProvider};
    use relkit_store::MemoryObjectStore;
    use std::sync::OnceLock;

    fn rev(s: &str) -> Revision {
        Revision::new(s).unwrap()
    }

    fn keys() -> LocalKeyProvider {
        LocalKeyProvider::from_seed(&[1u8; 32])
    }

    fn verifying_key() -> &'static VerifyingKey {
        static KEY: OnceLock<VerifyingKey> = OnceLock::new();
        KEY.get_or_init(|| keys().verifying_key().unwrap())
    }

    fn build(dir: &std::path::Path, replica: &[u8]) -> (LocalArtifactSet, Vec<SignatureFile>) {
        std::fs::write(dir.join("replica"), replica).unwrap();
        std::fs::write(dir.join("nodemanager"), b"nm").unwrap();
        let set = LocalArtifactSet::scan(dir).unwrap();
        let sigs = sign_manifest(&keys(), set.manifest(), SignatureMode::Manifest).unwrap();
        (set, sigs)
    }

    fn request<'a>(set: &'a LocalArtifactSet, sigs: &'a [SignatureFile]) -> PublishRequest<'a> {
        PublishRequest {
            category: Category::release(),
            revision: rev("abc123"),
            set,
            signatures: sigs,
            verifying_key: verifying_key(),
        }
    }

    #[test]
    fn writes_artifacts_then_signature_then_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (set, sigs) = build(dir.path(), b"replica");
        let store = MemoryObjectStore::new();
        let report = Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap();
        assert_eq!(
            report.locations,
            vec![
                "release/abc123/nodemanager",
                "release/abc123/replica",
                "release/abc123/SHA256SUMS.sig",
                "release/abc123/SHA256SUMS",
            ]
        );
        assert_eq!(report.created, 4);
        assert_eq!(report.promotion, PromotionStatus::NotRequested);
        assert_eq!(
            store.get("release/abc123/SHA256SUMS").unwrap().unwrap(),
            set.manifest().render().into_bytes()
        );
    }

    #[test]
    fn second_identical_publish_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (set, sigs) = build(dir.path(), b"replica");
        let store = MemoryObjectStore::new();
        let publisher = Publisher::new(&store);
        publisher.publish(&request(&set, &sigs), None).unwrap();
        let again = publisher.publish(&request(&set, &sigs), None).unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.already_present, 4);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn different_bytes_conflict_and_original_survives() {
        let store = MemoryObjectStore::new();
        let first = tempfile::tempdir().unwrap();
        let (set, sigs) = build(first.path(), b"replica-v1");
        Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap();

        let second = tempfile::tempdir().unwrap();
        let (set2, sigs2) = build(second.path(), b"replica-v2");
        let err = Publisher::new(&store)
            .publish(&request(&set2, &sigs2), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            store.get("release/abc123/replica").unwrap().unwrap(),
            b"replica-v1"
        );
        assert_eq!(
            store.get("release/abc123/SHA256SUMS").unwrap().unwrap(),
            set.manifest().render().into_bytes()
        );
    }

    #[test]
    fn conflicting_set_writes_nothing() {
        let store = MemoryObjectStore::new();
        let first = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("replica"), b"replica").unwrap();
        let set = LocalArtifactSet::scan(first.path()).unwrap();
        let sigs = sign_manifest(&keys(), set.manifest(), SignatureMode::Manifest).unwrap();
        Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap();
        let before = store.list("release/abc123/").unwrap();

        // Same replica, one more artifact: only the manifest and signature differ.
        let second = tempfile::tempdir().unwrap();
        let (set2, sigs2) = build(second.path(), b"replica");
        let err = Publisher::new(&store)
            .publish(&request(&set2, &sigs2), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.list("release/abc123/").unwrap(), before);
        assert!(!store.exists("release/abc123/nodemanager").unwrap());
    }

    #[test]
    fn stale_signature_is_refused_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sigs) = build(dir.path(), b"replica");
        std::fs::write(dir.path().join("replica"), b"rebuilt").unwrap();
        let set = LocalArtifactSet::scan(dir.path()).unwrap();
        let store = MemoryObjectStore::new();
        let err = Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert!(store.is_empty());
    }

    #[test]
    fn signature_from_another_key_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (set, _) = build(dir.path(), b"replica");
        let other = LocalKeyProvider::from_seed(&[2u8; 32]);
        let sigs = sign_manifest(&other, set.manifest(), SignatureMode::Manifest).unwrap();
        let store = MemoryObjectStore::new();
        let err = Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert!(store.is_empty());
    }

    #[test]
    fn unsigned_set_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (set, _) = build(dir.path(), b"replica");
        let store = MemoryObjectStore::new();
        let err = Publisher::new(&store).publish(&request(&set, &[]), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert!(store.is_empty());
    }

    #[test]
    fn file_changed_after_scan_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let (set, sigs) = build(dir.path(), b"replica");
        std::fs::write(dir.path().join("replica"), b"swapped").unwrap();
        let store = MemoryObjectStore::new();
        let err = Publisher::new(&store).publish(&request(&set, &sigs), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert!(!store.exists("release/abc123/SHA256SUMS").unwrap());
    }

    #[test]
    fn promotion_advances_after_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (set, sigs) = build(dir.path(), b"replica");
        let store = MemoryObjectStore::new();
        let history = LinearHistory::new(vec![rev("abc123")]);
        let promote = PromotionRequest {
            branch: Branch::new("main").unwrap(),
            tag: MarkerTag::default(),
            oracle: &history,
        };
        let report = Publisher::new(&store)
            .publish(&request(&set, &sigs), Some(&promote))
            .unwrap();
        assert_eq!(report.promotion, PromotionStatus::Created);
        let tracker = PromotionTracker::new(&store);
        assert_eq!(
            tracker.get(&promote.branch, &promote.tag).unwrap(),
            Some(rev("abc123"))
        );
    }

    #[test]
    fn rejected_promotion_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (set, sigs) = build(dir.path(), b"replica");
        let store = MemoryObjectStore::new();
        let history = LinearHistory::new(vec![rev("fff999"), rev("abc123")]);
        let branch = Branch::new("main").unwrap();
        PromotionTracker::new(&store)
            .advance(&branch, &MarkerTag::default(), &rev("fff999"), false, &history)
            .unwrap();
        let promote = PromotionRequest {
            branch: branch.clone(),
            tag: MarkerTag::default(),
            oracle: &history,
        };
        let report = Publisher::new(&store)
            .publish(&request(&set, &sigs), Some(&promote))
            .unwrap();
        assert_eq!(
            report.promotion,
            PromotionStatus::Rejected {
                current: rev("fff999")
            }
        );
        assert!(store.exists("release/abc123/SHA256SUMS").unwrap());
    }
}
