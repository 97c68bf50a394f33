//! # Fetch Subcommand
//!
//! ```bash
//! relkit fetch --remote-path release --revision abc123 --out ./bin
//! relkit fetch --remote-path canisters --latest-to main --git --out ./wasm --include '*.wasm'
//! ```
//!
//! With `--latest-to <branch>` the search starts at `--from` if given.
//! Otherwise it starts at the branch head when `--git` is used, and at
//! the branch's promotion marker with `--history`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use relkit_core::{Category, PipelineError, Revision};
use relkit_pipeline::{
    resolve_revision, retry_transient, FetchRequest, Fetcher, PromotionTracker, RevisionSelector,
};
use relkit_store::ObjectStore;

use crate::{parse_branch, AncestryArgs, CliContext};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Artifact category (first path segment in the store).
    #[arg(long = "remote-path", value_name = "CATEGORY")]
    pub remote_path: String,

    /// Exact revision to fetch.
    #[arg(long, required_unless_present = "latest_to", conflicts_with = "latest_to")]
    pub revision: Option<String>,

    /// Fetch the newest complete set in this branch's first-parent history.
    #[arg(long, value_name = "BRANCH")]
    pub latest_to: Option<String>,

    /// Where the "latest" search starts.
    #[arg(long, requires = "latest_to")]
    pub from: Option<String>,

    /// Destination directory.
    #[arg(long)]
    pub out: PathBuf,

    /// Only fetch artifacts whose names match (repeatable).
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Concurrent downloads (default from configuration).
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub ancestry: AncestryArgs,
}

pub fn run_fetch(args: &FetchArgs, ctx: &CliContext) -> Result<u8> {
    let category = Category::new(&args.remote_path)?;
    let store: Arc<dyn ObjectStore> = Arc::new(ctx.store());

    let revision = match (&args.revision, &args.latest_to) {
        (Some(rev), _) => Revision::new(rev)?,
        (None, Some(branch)) => {
            let from = latest_start(args, branch, store.as_ref(), ctx)?;
            let oracle = args.ancestry.oracle()?;
            resolve_revision(
                store.as_ref(),
                &category,
                &RevisionSelector::LatestFrom(from),
                oracle.as_ref(),
                ctx.config.look_back_window,
            )?
        }
        (None, None) => anyhow::bail!("either --revision or --latest-to is required"),
    };

    let request = FetchRequest {
        category: category.clone(),
        revision: revision.clone(),
        include: args.include.clone(),
        out_dir: args.out.clone(),
        concurrency: args.concurrency.unwrap_or(ctx.config.fetch_concurrency),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let fetcher = Fetcher::new(store);
    let report = retry_transient(ctx.config.stage_retries, "fetch", || {
        runtime.block_on(fetcher.fetch(&request))
    })
    .with_context(|| format!("fetching {category}/{revision}"))?;

    for file in &report.files {
        println!("{}  {}", file.digest, file.path.display());
    }
    eprintln!(
        "fetched {} artifacts of {category}/{} into {}",
        report.files.len(),
        report.revision,
        args.out.display()
    );
    Ok(0)
}

fn latest_start(
    args: &FetchArgs,
    branch: &str,
    store: &dyn ObjectStore,
    ctx: &CliContext,
) -> Result<Revision> {
    if let Some(from) = &args.from {
        return args.ancestry.resolve_ref(from);
    }
    if args.ancestry.git.is_some() {
        return args.ancestry.resolve_ref(branch);
    }
    let branch = parse_branch(branch)?;
    let tag = ctx.config.default_tag.clone();
    PromotionTracker::new(store)
        .get(&branch, &tag)?
        .ok_or_else(|| {
            PipelineError::not_found(format!("marker {tag} on {branch}; pass --from")).into()
        })
}
