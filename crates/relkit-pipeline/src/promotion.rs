//! # Promotion Tracker
//!
//! One marker per (branch, tag) records the newest revision that passed
//! the pipeline. Markers live at `markers/<branch>/<tag>` as JSON:
//!
//! ```json
//! {"revision":"abc123","updated_at":"2024-05-01T12:00:00Z","forced":false,"previous":"9f8e7d"}
//! ```
//!
//! ## Advance Protocol
//!
//! [`PromotionTracker::advance()`] is a compare-and-swap loop:
//!
//! 1. Read the stored marker bytes.
//! 2. Accept if there is no marker, the stored revision is the target
//!    (no write), the stored revision is an ancestor of the target, or
//!    `force` is set. Otherwise fail with `AncestryViolation`.
//! 3. Write the new record only if the stored bytes are unchanged. If
//!    another writer got in first, go back to 1 and re-check against
//!    what it wrote.
//!
//! Two concurrent advances to an older R1 and newer R2 therefore always
//! end at R2: either R1 lands first and R2 descends from it, or R2 lands
//! first and R1's re-check fails.
//!
//! Manual promotion goes through [`PromotionTracker::advance_published()`],
//! which also requires the target's set to be published.

use chrono::{DateTime, Utc};
use relkit_core::{Branch, Category, MarkerTag, PipelineError, Revision, ValidationError};
use relkit_store::{CasOutcome, ObjectStore};
use serde::{Deserialize, Serialize};

use crate::ancestry::{same_commit, AncestryOracle};
use crate::resolve::complete_revisions;

const MAX_CAS_ATTEMPTS: usize = 32;

/// Stored marker contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub revision: Revision,
    pub updated_at: DateTime<Utc>,
    /// Whether this value was set with `force`.
    #[serde(default)]
    pub forced: bool,
    /// The revision this one replaced.
    #[serde(default)]
    pub previous: Option<Revision>,
}

/// What an accepted advance did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// No marker existed; it now points at the revision.
    Created,
    /// Moved forward from `from`.
    Advanced { from: Revision },
    /// Moved to a non-descendant because `force` was set.
    Forced { from: Revision },
    /// Already pointed at the revision; nothing written.
    Unchanged,
}

/// Store key of a marker.
pub fn marker_key(branch: &Branch, tag: &MarkerTag) -> String {
    format!("markers/{}/{}", branch.key_segment(), tag)
}

/// Reads and advances promotion markers in an object store.
pub struct PromotionTracker<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> PromotionTracker<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// The full marker record, if any.
    pub fn record(
        &self,
        branch: &Branch,
        tag: &MarkerTag,
    ) -> Result<Option<MarkerRecord>, PipelineError> {
        let key = marker_key(branch, tag);
        self.store
            .get(&key)?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    /// The revision a marker points at, if any.
    pub fn get(&self, branch: &Branch, tag: &MarkerTag) -> Result<Option<Revision>, PipelineError> {
        Ok(self.record(branch, tag)?.map(|r| r.revision))
    }

    /// [`advance()`](Self::advance) guarded by the set check: `revision`
    /// must have a complete published set under `category`. Sets are only
    /// published after verification, so this keeps unverified revisions
    /// off the marker. `force` skips the check along with the ancestry one.
    ///
    /// # Errors
    ///
    /// `NotFound` if no complete set of `revision` exists, otherwise as
    /// [`advance()`](Self::advance).
    pub fn advance_published(
        &self,
        category: &Category,
        branch: &Branch,
        tag: &MarkerTag,
        revision: &Revision,
        force: bool,
        oracle: &dyn AncestryOracle,
    ) -> Result<AdvanceOutcome, PipelineError> {
        if force {
            tracing::warn!(%category, %revision, "promoting without checking the published set");
        } else {
            let complete = complete_revisions(self.store, category)?;
            if !complete.iter().any(|c| same_commit(c, revision)) {
                tracing::warn!(%branch, %tag, %category, %revision, "promotion rejected: no published set");
                return Err(PipelineError::not_found(format!(
                    "published set {category}/{revision}"
                )));
            }
        }
        self.advance(branch, tag, revision, force, oracle)
    }

    /// Move the marker to `revision`.
    ///
    /// # Errors
    ///
    /// `AncestryViolation` if the stored revision is not an ancestor of
    /// `revision` and `force` is unset. `TransientIo` if the CAS keeps
    /// losing to other writers.
    pub fn advance(
        &self,
        branch: &Branch,
        tag: &MarkerTag,
        revision: &Revision,
        force: bool,
        oracle: &dyn AncestryOracle,
    ) -> Result<AdvanceOutcome, PipelineError> {
        let key = marker_key(branch, tag);
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current_bytes = self.store.get(&key)?;
            let current = current_bytes
                .as_deref()
                .map(|b| decode(&key, b))
                .transpose()?;

            let (outcome, forced) = match &current {
                None => (AdvanceOutcome::Created, false),
                Some(rec) if same_commit(&rec.revision, revision) => {
                    tracing::debug!(%branch, %tag, %revision, "marker already at revision");
                    return Ok(AdvanceOutcome::Unchanged);
                }
                Some(rec) if oracle.is_ancestor(&rec.revision, revision)? => (
                    AdvanceOutcome::Advanced {
                        from: rec.revision.clone(),
                    },
                    false,
                ),
                Some(rec) if force => {
                    tracing::warn!(%branch, %tag, from = %rec.revision, to = %revision, "forcing marker to non-descendant");
                    (
                        AdvanceOutcome::Forced {
                            from: rec.revision.clone(),
                        },
                        true,
                    )
                }
                Some(rec) => {
                    tracing::warn!(%branch, %tag, current = %rec.revision, attempted = %revision, "promotion rejected: not a descendant");
                    return Err(PipelineError::AncestryViolation {
                        branch: branch.clone(),
                        current: rec.revision.clone(),
                        attempted: revision.clone(),
                    });
                }
            };

            let record = MarkerRecord {
                revision: revision.clone(),
                updated_at: Utc::now(),
                forced,
                previous: current.map(|r| r.revision),
            };
            let bytes = serde_json::to_vec(&record).map_err(|e| {
                PipelineError::TransientIo(format!("encoding marker {key}: {e}"))
            })?;
            match self
                .store
                .compare_and_swap(&key, current_bytes.as_deref(), &bytes)?
            {
                CasOutcome::Swapped => {
                    tracing::info!(%branch, %tag, %revision, ?outcome, "marker advanced");
                    return Ok(outcome);
                }
                CasOutcome::Stale { .. } => {
                    tracing::debug!(%branch, %tag, attempt, "marker changed underneath, re-checking");
                }
            }
        }
        Err(PipelineError::TransientIo(format!(
            "marker {key} still contended after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<MarkerRecord, PipelineError> {
    serde_json::from_slice(bytes).map_err(|e| {
        ValidationError::MalformedMarker {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestry::LinearHistory;
    use relkit_core::ErrorKind;
    use relkit_store::MemoryObjectStore;
    use std::sync::Arc;

    fn rev(s: &str) -> Revision {
        Revision::new(s).unwrap()
    }

    fn main_branch() -> Branch {
        Branch::new("main").unwrap()
    }

    fn history() -> LinearHistory {
        LinearHistory::new(vec![rev("ccc333"), rev("bbb222"), rev("aaa111")])
    }

    #[test]
    fn get_on_empty_store_is_none() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        assert!(tracker.get(&main_branch(), &MarkerTag::default()).unwrap().is_none());
    }

    #[test]
    fn first_advance_creates_marker() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        assert_eq!(
            tracker.advance(&main_branch(), &tag, &rev("aaa111"), false, &history()).unwrap(),
            AdvanceOutcome::Created
        );
        assert_eq!(tracker.get(&main_branch(), &tag).unwrap(), Some(rev("aaa111")));
        assert!(store.exists("markers/main/build-ok").unwrap());
    }

    #[test]
    fn advance_forward_records_previous() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        tracker.advance(&main_branch(), &tag, &rev("aaa111"), false, &history()).unwrap();
        assert_eq!(
            tracker.advance(&main_branch(), &tag, &rev("ccc333"), false, &history()).unwrap(),
            AdvanceOutcome::Advanced { from: rev("aaa111") }
        );
        let record = tracker.record(&main_branch(), &tag).unwrap().unwrap();
        assert_eq!(record.previous, Some(rev("aaa111")));
        assert!(!record.forced);
    }

    #[test]
    fn advance_backward_is_rejected_and_marker_kept() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        tracker.advance(&main_branch(), &tag, &rev("ccc333"), false, &history()).unwrap();
        let err = tracker
            .advance(&main_branch(), &tag, &rev("aaa111"), false, &history())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AncestryViolation);
        assert_eq!(tracker.get(&main_branch(), &tag).unwrap(), Some(rev("ccc333")));
    }

    #[test]
    fn force_overrides_ancestry() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        tracker.advance(&main_branch(), &tag, &rev("ccc333"), false, &history()).unwrap();
        assert_eq!(
            tracker.advance(&main_branch(), &tag, &rev("aaa111"), true, &history()).unwrap(),
            AdvanceOutcome::Forced { from: rev("ccc333") }
        );
        assert!(tracker.record(&main_branch(), &tag).unwrap().unwrap().forced);
    }

    #[test]
    fn unpublished_revision_is_not_promoted() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        let err = tracker
            .advance_published(&Category::release(), &main_branch(), &tag, &rev("aaa111"), false, &history())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.is_empty());

        store.put_if_absent("release/aaa111/SHA256SUMS", b"").unwrap();
        assert_eq!(
            tracker
                .advance_published(&Category::release(), &main_branch(), &tag, &rev("aaa111"), false, &history())
                .unwrap(),
            AdvanceOutcome::Created
        );
        // Published under another category only.
        store.put_if_absent("canisters/ccc333/SHA256SUMS", b"").unwrap();
        assert!(tracker
            .advance_published(&Category::release(), &main_branch(), &tag, &rev("ccc333"), false, &history())
            .is_err());
        assert_eq!(
            tracker
                .advance_published(&Category::release(), &main_branch(), &tag, &rev("ccc333"), true, &history())
                .unwrap(),
            AdvanceOutcome::Advanced { from: rev("aaa111") }
        );
    }

    #[test]
    fn same_revision_is_unchanged() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let tag = MarkerTag::default();
        tracker.advance(&main_branch(), &tag, &rev("bbb222"), false, &history()).unwrap();
        let before = store.get("markers/main/build-ok").unwrap();
        assert_eq!(
            tracker.advance(&main_branch(), &tag, &rev("bbb222"), false, &history()).unwrap(),
            AdvanceOutcome::Unchanged
        );
        assert_eq!(store.get("markers/main/build-ok").unwrap(), before);
    }

    #[test]
    fn tags_and_branches_are_independent() {
        let store = MemoryObjectStore::new();
        let tracker = PromotionTracker::new(&store);
        let release = Branch::new("release/rc-1").unwrap();
        let tests_ok = MarkerTag::new("tests-ok").unwrap();
        tracker.advance(&main_branch(), &MarkerTag::default(), &rev("ccc333"), false, &history()).unwrap();
        tracker.advance(&release, &tests_ok, &rev("aaa111"), false, &history()).unwrap();
        assert_eq!(tracker.get(&release, &tests_ok).unwrap(), Some(rev("aaa111")));
        assert!(tracker.get(&release, &MarkerTag::default()).unwrap().is_none());
        assert!(store.exists("markers/release%2Frc-1/tests-ok").unwrap());
    }

    #[test]
    fn malformed_marker_is_reported() {
        let store = MemoryObjectStore::new();
        store.overwrite("markers/main/build-ok", b"not json");
        let tracker = PromotionTracker::new(&store);
        let err = tracker.get(&main_branch(), &MarkerTag::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn concurrent_older_and_newer_end_at_newer() {
        for _ in 0..50 {
            let store = Arc::new(MemoryObjectStore::new());
            let history = Arc::new(history());
            PromotionTracker::new(store.as_ref())
                .advance(&main_branch(), &MarkerTag::default(), &rev("aaa111"), false, history.as_ref())
                .unwrap();

            let spawn = |target: &'static str| {
                let store = Arc::clone(&store);
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    PromotionTracker::new(store.as_ref()).advance(
                        &main_branch(),
                        &MarkerTag::default(),
                        &rev(target),
                        false,
                        history.as_ref(),
                    )
                })
            };
            let older = spawn("bbb222");
            let newer = spawn("ccc333");
            let older = older.join().unwrap();
            let newer = newer.join().unwrap();

            assert!(newer.is_ok());
            if let Err(e) = older {
                assert_eq!(e.kind(), ErrorKind::AncestryViolation);
            }
            let tracker = PromotionTracker::new(store.as_ref());
            assert_eq!(
                tracker.get(&main_branch(), &MarkerTag::default()).unwrap(),
                Some(rev("ccc333"))
            );
        }
    }
}
