//! # Key and Signature Subcommands
//!
//! - `relkit keygen --output <dir> --prefix <p>` writes `<p>.key` (hex
//!   seed) and `<p>.pub` (hex public key).
//! - `relkit sign <dir> [--per-artifact] [--key <file>]` writes
//!   `SHA256SUMS` and detached signatures. Without `--key` the seed is
//!   read from the configured environment variable.
//! - `relkit verify-signature <dir> --pubkey <file>` re-hashes the
//!   directory and checks its signatures.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use relkit_crypto::{EnvKeyProvider, FileKeyProvider, KeyProvider, SigningKey, VerifyingKey};
use relkit_pipeline::{sign_directory, verify_directory, SignatureMode};

use crate::CliContext;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Directory to write the key files into.
    #[arg(long)]
    pub output: PathBuf,

    /// File name prefix for `<prefix>.key` and `<prefix>.pub`.
    #[arg(long, default_value = "relkit")]
    pub prefix: String,
}

pub fn run_keygen(args: &KeygenArgs, _ctx: &CliContext) -> Result<u8> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let key = SigningKey::generate(&mut rand_core::OsRng);
    let key_path = args.output.join(format!("{}.key", args.prefix));
    let pub_path = args.output.join(format!("{}.pub", args.prefix));

    write_new(&key_path, key.to_hex().as_bytes(), true)?;
    write_new(&pub_path, key.verifying_key().to_hex().as_bytes(), false)?;

    tracing::info!(public_key = %key.verifying_key(), "generated signing key");
    println!("private key: {}", key_path.display());
    println!("public key:  {}", pub_path.display());
    Ok(0)
}

/// Create `path`, refusing to replace an existing file.
fn write_new(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Directory of artifacts to sign.
    pub dir: PathBuf,

    /// Sign every artifact separately instead of the manifest.
    #[arg(long)]
    pub per_artifact: bool,

    /// Hex seed file (default: the configured environment variable).
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,
}

pub fn run_sign(args: &SignArgs, ctx: &CliContext) -> Result<u8> {
    let provider = load_provider(args.key.as_deref(), ctx)?;
    let mode = if args.per_artifact {
        SignatureMode::PerArtifact
    } else {
        SignatureMode::Manifest
    };
    let files = sign_directory(&args.dir, provider.as_ref(), mode)?;
    for file in &files {
        println!("{}", args.dir.join(file.name.as_str()).display());
    }
    Ok(0)
}

/// The key from `path` if given, else from the configured environment
/// variable.
pub fn load_provider(path: Option<&Path>, ctx: &CliContext) -> Result<Box<dyn KeyProvider>> {
    Ok(match path {
        Some(p) => Box::new(FileKeyProvider::from_file(p)?),
        None => Box::new(EnvKeyProvider::from_env(&ctx.config.signing_key_env)?),
    })
}

/// Public key from a hex file if given, else derived from the configured
/// signing key variable.
pub fn load_public_key(path: Option<&Path>, ctx: &CliContext) -> Result<VerifyingKey> {
    match path {
        Some(p) => {
            let hex = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            Ok(VerifyingKey::from_hex(&hex)?)
        }
        None => Ok(load_provider(None, ctx)?.verifying_key()?),
    }
}

#[derive(Args, Debug)]
pub struct VerifySignatureArgs {
    /// Signed artifact directory.
    pub dir: PathBuf,

    /// Hex public key file.
    #[arg(long, value_name = "FILE")]
    pub pubkey: PathBuf,
}

pub fn run_verify_signature(args: &VerifySignatureArgs, ctx: &CliContext) -> Result<u8> {
    let key = load_public_key(Some(&args.pubkey), ctx)?;
    let mode = verify_directory(&args.dir, &key)?;
    let what = match mode {
        SignatureMode::Manifest => "manifest signature",
        SignatureMode::PerArtifact => "per-artifact signatures",
    };
    println!("{}: {what} valid", args.dir.display());
    Ok(0)
}
