//! # Promote Subcommand
//!
//! Read or move a branch's promotion marker.
//!
//! ```bash
//! relkit promote get --branch main
//! relkit promote advance --branch main --revision abc123 --git
//! ```
//!
//! `advance` exits 2 when the target has no complete published set under
//! `--remote-path`, and 5 when the stored revision is not an ancestor of
//! the new one. `--force` overrides both.

use anyhow::Result;
use clap::{Args, Subcommand};
use relkit_core::Category;
use relkit_pipeline::{AdvanceOutcome, PromotionTracker};

use crate::{parse_branch, print_json, AncestryArgs, CliContext};

#[derive(Args, Debug)]
pub struct PromoteArgs {
    #[command(subcommand)]
    pub command: PromoteCommand,
}

#[derive(Subcommand, Debug)]
pub enum PromoteCommand {
    /// Print the marker record as JSON.
    Get {
        #[arg(long, env = "RELKIT_BRANCH")]
        branch: String,

        #[arg(long)]
        tag: Option<String>,
    },

    /// Move the marker forward to a revision.
    Advance {
        #[arg(long, env = "RELKIT_BRANCH")]
        branch: String,

        #[arg(long)]
        tag: Option<String>,

        /// Target revision (or any ref, with `--git`).
        #[arg(long, env = "RELKIT_REVISION")]
        revision: String,

        /// Category whose published set the target must have.
        #[arg(long = "remote-path", value_name = "CATEGORY", default_value = "release")]
        remote_path: String,

        /// Move the marker even if the target is not a descendant or has
        /// no published set.
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        ancestry: AncestryArgs,
    },
}

pub fn run_promote(args: &PromoteArgs, ctx: &CliContext) -> Result<u8> {
    let store = ctx.store();
    let tracker = PromotionTracker::new(&store);
    match &args.command {
        PromoteCommand::Get { branch, tag } => {
            let branch = parse_branch(branch)?;
            let tag = ctx.tag_or_default(tag.as_deref())?;
            match tracker.record(&branch, &tag)? {
                Some(record) => {
                    print_json(&record)?;
                    Ok(0)
                }
                None => Err(relkit_core::PipelineError::not_found(format!(
                    "marker {tag} on {branch}"
                ))
                .into()),
            }
        }
        PromoteCommand::Advance {
            branch,
            tag,
            revision,
            remote_path,
            force,
            ancestry,
        } => {
            let category = Category::new(remote_path)?;
            let branch = parse_branch(branch)?;
            let tag = ctx.tag_or_default(tag.as_deref())?;
            let revision = ancestry.resolve_ref(revision)?;
            let oracle = ancestry.oracle()?;
            let outcome = tracker.advance_published(
                &category,
                &branch,
                &tag,
                &revision,
                *force,
                oracle.as_ref(),
            )?;
            match outcome {
                AdvanceOutcome::Created => println!("{branch}/{tag}: set to {revision}"),
                AdvanceOutcome::Advanced { from } => {
                    println!("{branch}/{tag}: {from} -> {revision}")
                }
                AdvanceOutcome::Forced { from } => {
                    println!("{branch}/{tag}: {from} -> {revision} (forced)")
                }
                AdvanceOutcome::Unchanged => println!("{branch}/{tag}: already at {revision}"),
            }
            Ok(0)
        }
    }
}
