//! # Ancestry Oracles
//!
//! Source control is consulted through [`AncestryOracle`] for two
//! questions: is one commit an ancestor of another (marker advances), and
//! what is the first-parent history below a commit ("latest" resolution).
//!
//! - [`LinearHistory`]: an explicit list of revisions, newest first. Used
//!   in tests and where the caller exports history to a file.
//! - [`GitAncestry`]: runs `git` against a local clone.
//!
//! Revisions are compared by prefix ([`same_commit()`]) so an abbreviated
//! id matches its full form.

use std::path::{Path, PathBuf};
use std::process::Command;

use relkit_core::{PipelineError, Revision};

/// Whether two (possibly abbreviated) ids name the same commit.
pub fn same_commit(a: &Revision, b: &Revision) -> bool {
    a.as_str().starts_with(b.as_str()) || b.as_str().starts_with(a.as_str())
}

/// Answers ancestry questions about commits.
pub trait AncestryOracle: Send + Sync {
    /// Whether `ancestor` is `descendant` or one of its ancestors.
    fn is_ancestor(&self, ancestor: &Revision, descendant: &Revision)
        -> Result<bool, PipelineError>;

    /// Up to `limit` first-parent commits starting at `from` (inclusive),
    /// newest first.
    fn first_parent_history(
        &self,
        from: &Revision,
        limit: usize,
    ) -> Result<Vec<Revision>, PipelineError>;
}

/// A single line of history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearHistory {
    newest_first: Vec<Revision>,
}

impl LinearHistory {
    pub fn new(newest_first: Vec<Revision>) -> Self {
        Self { newest_first }
    }

    /// Parse one revision per line, newest first. Blank lines and `#`
    /// comments are skipped.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let revisions = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(Revision::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(revisions))
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path.display(), e))?;
        Self::parse(&text)
    }

    fn position(&self, rev: &Revision) -> Option<usize> {
        self.newest_first.iter().position(|r| same_commit(r, rev))
    }

    pub fn len(&self) -> usize {
        self.newest_first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.newest_first.is_empty()
    }
}

impl AncestryOracle for LinearHistory {
    fn is_ancestor(
        &self,
        ancestor: &Revision,
        descendant: &Revision,
    ) -> Result<bool, PipelineError> {
        match (self.position(ancestor), self.position(descendant)) {
            (Some(a), Some(d)) => Ok(a >= d),
            _ => Ok(false),
        }
    }

    fn first_parent_history(
        &self,
        from: &Revision,
        limit: usize,
    ) -> Result<Vec<Revision>, PipelineError> {
        let start = self
            .position(from)
            .ok_or_else(|| PipelineError::not_found(format!("revision {from} in history")))?;
        Ok(self.newest_first[start..].iter().take(limit).cloned().collect())
    }
}

/// Ancestry from a git working copy.
#[derive(Debug, Clone)]
pub struct GitAncestry {
    repo: PathBuf,
}

impl GitAncestry {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output, PipelineError> {
        tracing::debug!(repo = %self.repo.display(), ?args, "running git");
        Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| PipelineError::io("running git", e))
    }

    /// Resolve a ref (branch, tag, `HEAD`) to a commit.
    pub fn rev_parse(&self, reference: &str) -> Result<Revision, PipelineError> {
        let out = self.git(&["rev-parse", "--verify", &format!("{reference}^{{commit}}")])?;
        if !out.status.success() {
            return Err(PipelineError::not_found(format!("git ref {reference}")));
        }
        Ok(Revision::new(String::from_utf8_lossy(&out.stdout).trim())?)
    }
}

impl AncestryOracle for GitAncestry {
    fn is_ancestor(
        &self,
        ancestor: &Revision,
        descendant: &Revision,
    ) -> Result<bool, PipelineError> {
        let out = self.git(&[
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ])?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(PipelineError::not_found(format!(
                "git ancestry {ancestor}..{descendant}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
        }
    }

    fn first_parent_history(
        &self,
        from: &Revision,
        limit: usize,
    ) -> Result<Vec<Revision>, PipelineError> {
        let max = format!("--max-count={limit}");
        let out = self.git(&["rev-list", "--first-parent", &max, from.as_str()])?;
        if !out.status.success() {
            return Err(PipelineError::not_found(format!(
                "git history of {from}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(|l| Revision::new(l.trim()).map_err(PipelineError::from))
            .collect()
    }
}
