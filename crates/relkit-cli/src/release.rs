//! # Release Subcommand
//!
//! Runs verify → sign → publish → promote for one revision in a single
//! process and prints the [`ReleaseReport`](relkit_pipeline::ReleaseReport)
//! as JSON.
//!
//! A non-blocking determinism mismatch prints the report with status
//! `mismatch_non_blocking` and exits 0; nothing is published.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use relkit_core::{BuildVariant, Category, Revision};
use relkit_pipeline::{
    run_release, AncestryOracle, LinearHistory, ReleaseContext, ReleaseInputs, ReleaseStatus,
    SignatureMode,
};

use crate::keys::load_provider;
use crate::{parse_branch, print_json, AncestryArgs, CliContext};

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Build to publish.
    pub primary: PathBuf,

    /// Independent build of the same revision (directory or `SHA256SUMS`).
    pub secondary: PathBuf,

    #[arg(long, default_value = BuildVariant::NATIVE)]
    pub primary_variant: String,

    #[arg(long, default_value = BuildVariant::CONTAINER)]
    pub secondary_variant: String,

    #[arg(long = "remote-path", value_name = "CATEGORY", default_value = "release")]
    pub remote_path: String,

    #[arg(long, env = "RELKIT_REVISION")]
    pub revision: String,

    #[arg(long, env = "RELKIT_BRANCH")]
    pub branch: Option<String>,

    #[arg(long, requires = "branch")]
    pub tag: Option<String>,

    /// Hex seed file (default: the configured environment variable).
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    #[arg(long)]
    pub per_artifact: bool,

    /// Fail with exit 6 when the builds differ.
    #[arg(long)]
    pub block_on_mismatch: bool,

    #[command(flatten)]
    pub ancestry: AncestryArgs,
}

pub fn run_release_cmd(args: &ReleaseArgs, ctx: &CliContext) -> Result<u8> {
    let mut config = ctx.config.clone();
    config.block_on_mismatch |= args.block_on_mismatch;

    let keys = load_provider(args.key.as_deref(), ctx)?;
    let oracle: Box<dyn AncestryOracle> = match &args.branch {
        Some(_) => args.ancestry.oracle()?,
        None => Box::new(LinearHistory::default()),
    };
    let inputs = ReleaseInputs {
        category: Category::new(&args.remote_path)?,
        revision: Revision::new(&args.revision)?,
        primary: args.primary.clone(),
        primary_variant: BuildVariant::new(&args.primary_variant)?,
        secondary: args.secondary.clone(),
        secondary_variant: BuildVariant::new(&args.secondary_variant)?,
        branch: args.branch.as_deref().map(parse_branch).transpose()?,
        tag: args
            .tag
            .as_deref()
            .map(relkit_core::MarkerTag::new)
            .transpose()?,
        signature_mode: if args.per_artifact {
            SignatureMode::PerArtifact
        } else {
            SignatureMode::Manifest
        },
    };
    let store = ctx.store();
    let release_ctx = ReleaseContext {
        store: &store,
        keys: keys.as_ref(),
        oracle: oracle.as_ref(),
    };
    let report = run_release(&config, &release_ctx, &inputs)?;
    if report.status == ReleaseStatus::MismatchNonBlocking {
        eprint!("{}", report.verification.diff);
    }
    print_json(&report)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relkit_pipeline::PipelineConfig;
    use relkit_store::ObjectStore;

    fn setup(replica_b: &[u8]) -> (tempfile::TempDir, CliContext, ReleaseArgs) {
        let dir = tempfile::tempdir().unwrap();
        for (sub, replica) in [("a", &b"r"[..]), ("b", replica_b)] {
            let d = dir.path().join(sub);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("replica"), replica).unwrap();
        }
        let key = dir.path().join("k.key");
        std::fs::write(&key, "07".repeat(32)).unwrap();
        let history = dir.path().join("history");
        std::fs::write(&history, "abc123\n").unwrap();

        let mut config = PipelineConfig::default();
        config.store_root = dir.path().join("store");
        let args = ReleaseArgs {
            primary: dir.path().join("a"),
            secondary: dir.path().join("b"),
            primary_variant: BuildVariant::NATIVE.into(),
            secondary_variant: BuildVariant::CONTAINER.into(),
            remote_path: "release".into(),
            revision: "abc123".into(),
            branch: Some("main".into()),
            tag: None,
            key: Some(key),
            per_artifact: false,
            block_on_mismatch: false,
            ancestry: AncestryArgs {
                history: Some(history),
                git: None,
            },
        };
        (dir, CliContext::new(config), args)
    }

    #[test]
    fn matching_builds_publish() {
        let (_dir, ctx, args) = setup(b"r");
        assert_eq!(run_release_cmd(&args, &ctx).unwrap(), 0);
        assert!(ctx.store().exists("release/abc123/SHA256SUMS").unwrap());
        assert!(ctx.store().exists("markers/main/build-ok").unwrap());
    }

    #[test]
    fn mismatch_skips_publish_and_blocks_on_request() {
        let (_dir, ctx, mut args) = setup(b"other");
        assert_eq!(run_release_cmd(&args, &ctx).unwrap(), 0);
        assert!(ctx.store().list("").unwrap().is_empty());

        args.block_on_mismatch = true;
        let err = run_release_cmd(&args, &ctx).unwrap_err();
        assert_eq!(crate::exit_code(&err), 6);
    }
}
