//! # relkit CLI entry point
//!
//! Parses arguments, loads configuration, installs logging and dispatches
//! to the subcommand handlers in `relkit_cli`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use relkit_cli::build_image::{run_build_image, BuildImageArgs};
use relkit_cli::descriptor::{run_descriptor, DescriptorArgs};
use relkit_cli::fetch::{run_fetch, FetchArgs};
use relkit_cli::keys::{
    run_keygen, run_sign, run_verify_signature, KeygenArgs, SignArgs, VerifySignatureArgs,
};
use relkit_cli::manifest::{run_manifest, run_verify, ManifestArgs, VerifyArgs};
use relkit_cli::promote::{run_promote, PromoteArgs};
use relkit_cli::publish::{run_publish, PublishArgs};
use relkit_cli::release::{run_release_cmd, ReleaseArgs};
use relkit_cli::{exit_code, CliContext};
use relkit_pipeline::PipelineConfig;

/// Release artifact integrity and promotion.
///
/// Verifies that independent builds agree, signs and publishes artifact
/// sets to an immutable store, tracks promoted revisions per branch, and
/// fetches the newest complete set for a branch.
#[derive(Parser, Debug)]
#[command(name = "relkit", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML configuration file.
    #[arg(long, global = true, env = "RELKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Object store root directory (overrides configuration).
    #[arg(long, global = true)]
    store_root: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a published artifact set.
    Fetch(FetchArgs),

    /// Upload a signed artifact set and optionally advance a marker.
    Publish(PublishArgs),

    /// Print or write the SHA256SUMS of a directory.
    Manifest(ManifestArgs),

    /// Compare two builds of the same revision.
    Verify(VerifyArgs),

    /// Build disk and update images.
    BuildImage(BuildImageArgs),

    /// Generate an Ed25519 key pair.
    Keygen(KeygenArgs),

    /// Sign a directory's manifest.
    Sign(SignArgs),

    /// Check a directory's signatures.
    VerifySignature(VerifySignatureArgs),

    /// Read or advance promotion markers.
    Promote(PromoteArgs),

    /// Print the release descriptor of a published revision.
    Descriptor(DescriptorArgs),

    /// Verify, sign, publish and promote one revision.
    Release(ReleaseArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(exit_code(&e));
        }
    };
    tracing::debug!(store_root = %config.store_root.display(), "configuration loaded");
    let ctx = CliContext::new(config);

    let result = match &cli.command {
        Commands::Fetch(args) => run_fetch(args, &ctx),
        Commands::Publish(args) => run_publish(args, &ctx),
        Commands::Manifest(args) => run_manifest(args, &ctx),
        Commands::Verify(args) => run_verify(args, &ctx),
        Commands::BuildImage(args) => run_build_image(args, &ctx),
        Commands::Keygen(args) => run_keygen(args, &ctx),
        Commands::Sign(args) => run_sign(args, &ctx),
        Commands::VerifySignature(args) => run_verify_signature(args, &ctx),
        Commands::Promote(args) => run_promote(args, &ctx),
        Commands::Descriptor(args) => run_descriptor(args, &ctx),
        Commands::Release(args) => run_release_cmd(args, &ctx),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the `-v` count picks the level.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(root) = &cli.store_root {
        config.store_root = root.clone();
    }
    Ok(config)
}
