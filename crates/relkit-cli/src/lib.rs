//! # relkit-cli — Command-Line Interface
//!
//! The `relkit` binary. Each stage of the release pipeline is a
//! subcommand, so CI jobs on different hosts can run them independently
//! against a shared store:
//!
//! ```bash
//! relkit verify build-a/ build-b/ --revision "$REV"
//! relkit sign build-a/
//! relkit publish build-a/ --remote-path release --revision "$REV" --branch main --git
//! relkit fetch --remote-path release --latest-to main --git --out ./bin
//! ```
//!
//! ## Crate Policy
//!
//! - Argument parsing and output live here. Everything else is a call
//!   into `relkit-pipeline`.
//! - Handlers return `anyhow::Result<u8>`: `Ok` carries the exit code,
//!   `Err` is mapped by [`exit_code()`].

pub mod build_image;
pub mod descriptor;
pub mod fetch;
pub mod keys;
pub mod manifest;
pub mod promote;
pub mod publish;
pub mod release;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use relkit_core::{Branch, MarkerTag, PipelineError, Revision};
use relkit_pipeline::{AncestryOracle, ConfigError, GitAncestry, LinearHistory, PipelineConfig};
use relkit_store::FsObjectStore;

/// Shared state handed to every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: PipelineConfig,
}

impl CliContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The filesystem store rooted at `store_root`.
    pub fn store(&self) -> FsObjectStore {
        FsObjectStore::new(&self.config.store_root)
    }

    /// `tag` if given, else the configured default.
    pub fn tag_or_default(&self, tag: Option<&str>) -> Result<MarkerTag> {
        Ok(match tag {
            Some(t) => MarkerTag::new(t)?,
            None => self.config.default_tag.clone(),
        })
    }
}

/// Where ancestry questions are answered.
#[derive(Args, Debug, Clone, Default)]
pub struct AncestryArgs {
    /// File of revisions, newest first, one per line.
    #[arg(long, value_name = "FILE", conflicts_with = "git")]
    pub history: Option<PathBuf>,

    /// Query a git working copy (default: current directory).
    #[arg(long, value_name = "REPO", num_args = 0..=1, default_missing_value = ".")]
    pub git: Option<PathBuf>,
}

impl AncestryArgs {
    /// Whether either source was given.
    pub fn is_set(&self) -> bool {
        self.history.is_some() || self.git.is_some()
    }

    /// Build the oracle, failing if no source was given.
    pub fn oracle(&self) -> Result<Box<dyn AncestryOracle>> {
        if let Some(path) = &self.history {
            return Ok(Box::new(LinearHistory::from_file(path)?));
        }
        if let Some(repo) = &self.git {
            return Ok(Box::new(GitAncestry::new(repo)));
        }
        bail!("an ancestry source is required: pass --history <FILE> or --git [REPO]")
    }

    /// Resolve a user-supplied reference. With `--git` any ref git
    /// understands is accepted; otherwise it must be a revision id.
    pub fn resolve_ref(&self, reference: &str) -> Result<Revision> {
        match &self.git {
            Some(repo) => Ok(GitAncestry::new(repo).rev_parse(reference)?),
            None => Ok(Revision::new(reference)?),
        }
    }
}

/// Parse a branch name from the command line.
pub fn parse_branch(raw: &str) -> Result<Branch> {
    Ok(Branch::new(raw)?)
}

/// Exit code for a failed command.
///
/// Walks the error chain for a taxonomy error; anything else is `1`.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PipelineError>() {
            return e.kind().exit_code();
        }
        if cause.downcast_ref::<relkit_core::ValidationError>().is_some()
            || cause.downcast_ref::<ConfigError>().is_some()
        {
            return relkit_core::ErrorKind::Invalid.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<relkit_crypto::CryptoError>() {
            return match e {
                relkit_crypto::CryptoError::Io(_) => relkit_core::ErrorKind::TransientIo.exit_code(),
                _ => relkit_core::ErrorKind::Crypto.exit_code(),
            };
        }
    }
    1
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
