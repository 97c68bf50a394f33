//! # Descriptor Subcommand
//!
//! Prints the release descriptor of a published revision as JSON.

use anyhow::{Context, Result};
use clap::Args;
use relkit_core::Revision;
use relkit_pipeline::{describe_release, UpgradeContent};
use url::Url;

use crate::{print_json, CliContext};

#[derive(Args, Debug)]
pub struct DescriptorArgs {
    #[arg(long, env = "RELKIT_REVISION")]
    pub revision: String,

    /// Which binaries to include: all, replica or nodemanager.
    #[arg(long, default_value = "all")]
    pub content: UpgradeContent,

    /// Public URL the store is served under (default from configuration).
    #[arg(long)]
    pub base_url: Option<Url>,
}

pub fn run_descriptor(args: &DescriptorArgs, ctx: &CliContext) -> Result<u8> {
    let revision = Revision::new(&args.revision)?;
    let base_url = args
        .base_url
        .as_ref()
        .or(ctx.config.download_base_url.as_ref())
        .context("no download base URL: pass --base-url or set download_base_url")?;
    let descriptor = describe_release(&ctx.store(), base_url, &revision, args.content)?;
    print_json(&descriptor)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relkit_pipeline::PipelineConfig;

    #[test]
    fn requires_a_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.store_root = dir.path().to_path_buf();
        let args = DescriptorArgs {
            revision: "abc123".into(),
            content: UpgradeContent::All,
            base_url: None,
        };
        let err = run_descriptor(&args, &CliContext::new(config)).unwrap_err();
        assert_eq!(crate::exit_code(&err), 1);
    }

    #[test]
    fn unpublished_revision_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.store_root = dir.path().to_path_buf();
        config.download_base_url = Some(Url::parse("https://download.example.org/ic/").unwrap());
        let args = DescriptorArgs {
            revision: "abc123".into(),
            content: UpgradeContent::Replica,
            base_url: None,
        };
        let err = run_descriptor(&args, &CliContext::new(config)).unwrap_err();
        assert_eq!(crate::exit_code(&err), 2);
    }
}
