//! # "Latest" Resolution
//!
//! Finds the newest revision with a complete published set by walking
//! first-parent history backward from a reference point. Pure over its
//! inputs: the oracle supplies history, the caller supplies a snapshot of
//! which revisions are complete.

use std::collections::BTreeSet;

use relkit_core::{Category, PipelineError, Revision, MANIFEST_FILE_NAME};
use relkit_store::ObjectStore;

use crate::ancestry::{same_commit, AncestryOracle};

/// Revisions of one category whose `SHA256SUMS` has been published.
pub fn complete_revisions(
    store: &dyn ObjectStore,
    category: &Category,
) -> Result<BTreeSet<Revision>, PipelineError> {
    let prefix = format!("{category}/");
    let suffix = format!("/{MANIFEST_FILE_NAME}");
    let mut complete = BTreeSet::new();
    for key in store.list(&prefix)? {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        if let Some(rev) = rest.strip_suffix(&suffix) {
            if let Ok(rev) = Revision::new(rev) {
                complete.insert(rev);
            }
        }
    }
    Ok(complete)
}

/// The newest revision at or below `from` (first-parent) that is in
/// `complete`, looking at most `window` commits back.
///
/// Returns the revision in its `complete` spelling, so it can be used
/// directly as a store key.
///
/// # Errors
///
/// `NotFound` if no complete revision lies within the window.
pub fn resolve_latest(
    oracle: &dyn AncestryOracle,
    complete: &BTreeSet<Revision>,
    category: &Category,
    from: &Revision,
    window: usize,
) -> Result<Revision, PipelineError> {
    let history = oracle.first_parent_history(from, window)?;
    for (depth, candidate) in history.iter().enumerate() {
        if let Some(hit) = complete.iter().find(|c| same_commit(c, candidate)) {
            tracing::info!(%category, %from, revision = %hit, depth, "resolved latest complete revision");
            return Ok(hit.clone());
        }
    }
    Err(PipelineError::not_found(format!(
        "complete {category} artifact set within {window} first-parent commits of {from}"
    )))
}
