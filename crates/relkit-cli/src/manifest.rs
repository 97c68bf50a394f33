//! # Manifest and Verify Subcommands
//!
//! `relkit manifest <dir> [--write]` prints (or writes) the `SHA256SUMS`
//! of a build directory.
//!
//! `relkit verify <a> <b>` compares two builds of one revision. Either side
//! may be a directory or a `SHA256SUMS` file, labelled by
//! `--left-variant`/`--right-variant`. A mismatch prints the diff
//! and exits 0 unless `--block-on-mismatch` (or the configured policy)
//! makes it blocking.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use relkit_core::{BuildVariant, Category, Revision};
use relkit_pipeline::{
    load_manifest, verify_manifests, BuildManifest, LocalArtifactSet, VerificationReport,
};

use crate::CliContext;

#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Build output directory.
    pub dir: PathBuf,

    /// Write `SHA256SUMS` into the directory instead of printing it.
    #[arg(long)]
    pub write: bool,
}

pub fn run_manifest(args: &ManifestArgs, _ctx: &CliContext) -> Result<u8> {
    let set = LocalArtifactSet::scan(&args.dir)
        .with_context(|| format!("hashing {}", args.dir.display()))?;
    if args.write {
        let path = set.write_manifest()?;
        println!("wrote {} ({} entries)", path.display(), set.manifest().len());
    } else {
        print!("{}", set.manifest().render());
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// First build: directory or `SHA256SUMS` file.
    pub left: PathBuf,

    /// Second build: directory or `SHA256SUMS` file.
    pub right: PathBuf,

    /// Revision both builds were made from.
    #[arg(long, env = "RELKIT_REVISION")]
    pub revision: String,

    /// Artifact category being compared.
    #[arg(long, default_value = "release")]
    pub category: String,

    /// Variant that produced the first build.
    #[arg(long, default_value = BuildVariant::NATIVE)]
    pub left_variant: String,

    /// Variant that produced the second build.
    #[arg(long, default_value = BuildVariant::CONTAINER)]
    pub right_variant: String,

    /// Treat a mismatch as a blocking failure (exit 6).
    #[arg(long)]
    pub block_on_mismatch: bool,
}

fn compare(args: &VerifyArgs) -> Result<VerificationReport> {
    let revision = Revision::new(&args.revision)?;
    let category = Category::new(&args.category)?;
    let left_variant = BuildVariant::new(&args.left_variant)?;
    let right_variant = BuildVariant::new(&args.right_variant)?;
    let left = load_manifest(&args.left)
        .with_context(|| format!("loading {}", args.left.display()))?;
    let right = load_manifest(&args.right)
        .with_context(|| format!("loading {}", args.right.display()))?;
    Ok(verify_manifests(
        &revision,
        &category,
        BuildManifest::new(&left_variant, &left),
        BuildManifest::new(&right_variant, &right),
    ))
}

pub fn run_verify(args: &VerifyArgs, ctx: &CliContext) -> Result<u8> {
    let report = compare(args)?;
    let (category, revision) = (&report.category, &report.revision);
    if report.is_match() {
        println!(
            "{category}/{revision}: {} and {} agree",
            report.left_variant, report.right_variant
        );
        return Ok(0);
    }

    print!("{}", report.diff);
    eprintln!(
        "{category}/{revision}: {} and {} differ in {}",
        report.left_variant,
        report.right_variant,
        report.mismatched_names().join(", ")
    );
    if args.block_on_mismatch || ctx.config.block_on_mismatch {
        return Err(report.to_error().into());
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relkit_pipeline::PipelineConfig;

    fn build(dir: &std::path::Path, replica: &[u8]) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("replica"), replica).unwrap();
        std::fs::write(dir.join("nodemanager"), b"nm").unwrap();
    }

    fn verify_args(left: PathBuf, right: PathBuf, block: bool) -> VerifyArgs {
        VerifyArgs {
            left,
            right,
            revision: "abc123".into(),
            category: "release".into(),
            left_variant: BuildVariant::NATIVE.into(),
            right_variant: BuildVariant::CONTAINER.into(),
            block_on_mismatch: block,
        }
    }

    #[test]
    fn manifest_write_creates_sums_file() {
        let dir = tempfile::tempdir().unwrap();
        build(dir.path(), b"r");
        let ctx = CliContext::new(PipelineConfig::default());
        let code = run_manifest(
            &ManifestArgs {
                dir: dir.path().to_path_buf(),
                write: true,
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(code, 0);
        let text = std::fs::read_to_string(dir.path().join("SHA256SUMS")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn verify_mismatch_is_non_blocking_by_default() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("a"), b"r");
        build(&dir.path().join("b"), b"r2");
        let ctx = CliContext::new(PipelineConfig::default());
        let args = verify_args(dir.path().join("a"), dir.path().join("b"), false);
        assert_eq!(run_verify(&args, &ctx).unwrap(), 0);
    }

    #[test]
    fn verify_mismatch_blocks_with_flag() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("a"), b"r");
        build(&dir.path().join("b"), b"r2");
        let ctx = CliContext::new(PipelineConfig::default());
        let args = verify_args(dir.path().join("a"), dir.path().join("b"), true);
        let err = run_verify(&args, &ctx).unwrap_err();
        assert_eq!(crate::exit_code(&err), 6);
    }

    #[test]
    fn verify_labels_diff_with_variants() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("a"), b"r");
        build(&dir.path().join("b"), b"r2");
        let mut args = verify_args(dir.path().join("a"), dir.path().join("b"), false);
        args.left_variant = "bazel".into();
        let report = compare(&args).unwrap();
        assert!(report.diff.starts_with("--- bazel/SHA256SUMS\n+++ container/SHA256SUMS\n"));

        args.right_variant = "not a variant".into();
        let err = compare(&args).unwrap_err();
        assert_eq!(crate::exit_code(&err), 8);
    }

    #[test]
    fn verify_accepts_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("a"), b"r");
        build(&dir.path().join("b"), b"r");
        let sums = LocalArtifactSet::scan(&dir.path().join("b"))
            .unwrap()
            .write_manifest()
            .unwrap();
        let ctx = CliContext::new(PipelineConfig::default());
        let args = verify_args(dir.path().join("a"), sums, true);
        assert_eq!(run_verify(&args, &ctx).unwrap(), 0);
    }
}
