//! # Publish Subcommand
//!
//! ```bash
//! relkit publish out/ --remote-path release --revision abc123 --branch main --history revs.txt
//! ```
//!
//! The directory must already be signed (`relkit sign`). Its files are
//! re-hashed and checked against the local `SHA256SUMS`, and the
//! signatures are checked against `--pubkey` (or the public half of the
//! configured signing key) before anything is uploaded.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use relkit_core::{Category, PipelineError, Revision, MANIFEST_FILE_NAME};
use relkit_pipeline::{
    check_recorded_manifest, load_manifest, read_signatures, retry_transient, LocalArtifactSet,
    PromotionRequest, PublishRequest, Publisher,
};

use crate::keys::load_public_key;
use crate::{parse_branch, print_json, AncestryArgs, CliContext};

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Signed artifact directory.
    pub dir: PathBuf,

    /// Artifact category (first path segment in the store).
    #[arg(long = "remote-path", value_name = "CATEGORY")]
    pub remote_path: String,

    /// Revision the artifacts were built from.
    #[arg(long, env = "RELKIT_REVISION")]
    pub revision: String,

    /// Advance this branch's marker after publishing.
    #[arg(long, env = "RELKIT_BRANCH")]
    pub branch: Option<String>,

    /// Marker tag (default from configuration).
    #[arg(long, requires = "branch")]
    pub tag: Option<String>,

    /// Hex public key the signatures must verify under (default: derived
    /// from the configured signing key variable).
    #[arg(long, value_name = "FILE")]
    pub pubkey: Option<PathBuf>,

    #[command(flatten)]
    pub ancestry: AncestryArgs,
}

pub fn run_publish(args: &PublishArgs, ctx: &CliContext) -> Result<u8> {
    let category = Category::new(&args.remote_path)?;
    let revision = Revision::new(&args.revision)?;

    let set = LocalArtifactSet::scan(&args.dir)
        .with_context(|| format!("hashing {}", args.dir.display()))?;
    let recorded = load_manifest(&args.dir.join(MANIFEST_FILE_NAME))
        .with_context(|| format!("{} is not signed; run `relkit sign` first", args.dir.display()))?;
    check_recorded_manifest(&set, &recorded)?;
    if let Some(extra) = set.manifest().names().find(|n| !recorded.contains(n)) {
        return Err(PipelineError::MissingInput(format!(
            "{} is not listed in {MANIFEST_FILE_NAME}",
            set.path_of(extra).display()
        ))
        .into());
    }
    let signatures = read_signatures(&set)?;
    if signatures.is_empty() {
        bail!(PipelineError::Crypto(format!(
            "no signatures in {}; run `relkit sign` first",
            args.dir.display()
        )));
    }
    let verifying_key = load_public_key(args.pubkey.as_deref(), ctx)?;

    let oracle = match &args.branch {
        Some(_) => Some(args.ancestry.oracle()?),
        None => None,
    };
    let promotion = match (&args.branch, &oracle) {
        (Some(branch), Some(oracle)) => Some(PromotionRequest {
            branch: parse_branch(branch)?,
            tag: ctx.tag_or_default(args.tag.as_deref())?,
            oracle: oracle.as_ref(),
        }),
        _ => None,
    };

    let store = ctx.store();
    let publisher = Publisher::new(&store);
    let request = PublishRequest {
        category,
        revision,
        set: &set,
        signatures: &signatures,
        verifying_key: &verifying_key,
    };
    let report = retry_transient(ctx.config.stage_retries, "publish", || {
        publisher.publish(&request, promotion.as_ref())
    })?;
    print_json(&report)?;
    Ok(0)
}
