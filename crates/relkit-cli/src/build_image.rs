//! # Build-Image Subcommand
//!
//! ```bash
//! relkit build-image --binaries target/release --overlay rootfs/ --out images/ --version abc123
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use relkit_core::ArtifactName;
use relkit_pipeline::{ImageBuilder, ImageSpec};

use crate::CliContext;

#[derive(Args, Debug)]
pub struct BuildImageArgs {
    /// Directory holding the compiled binaries.
    #[arg(long)]
    pub binaries: PathBuf,

    /// Root filesystem overlay copied under `rootfs/`.
    #[arg(long)]
    pub overlay: PathBuf,

    /// Output directory for the images and their `SHA256SUMS`.
    #[arg(long)]
    pub out: PathBuf,

    /// Version string baked into the images.
    #[arg(long, env = "RELKIT_REVISION")]
    pub version: String,

    /// Add a debug login to the root filesystem.
    #[arg(long)]
    pub dev: bool,

    /// Use the instrumented replica build.
    #[arg(long)]
    pub malicious: bool,

    /// Required binaries (repeatable; default: replica and nodemanager).
    #[arg(long = "binary", value_name = "NAME")]
    pub binary: Vec<String>,
}

pub fn run_build_image(args: &BuildImageArgs, _ctx: &CliContext) -> Result<u8> {
    let mut spec = ImageSpec::new(&args.binaries, &args.overlay, &args.version)?;
    spec.dev = args.dev;
    spec.malicious = args.malicious;
    if !args.binary.is_empty() {
        spec.binaries = args
            .binary
            .iter()
            .map(ArtifactName::new)
            .collect::<Result<Vec<_>, _>>()?;
    }
    let built = ImageBuilder::new(spec).build(&args.out)?;
    print!("{}", built.manifest.render());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relkit_pipeline::PipelineConfig;

    #[test]
    fn builds_three_images() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let overlay = dir.path().join("overlay");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(overlay.join("etc")).unwrap();
        std::fs::write(bin.join("agent"), b"a").unwrap();
        std::fs::write(overlay.join("etc/hostname"), b"node\n").unwrap();

        let args = BuildImageArgs {
            binaries: bin,
            overlay,
            out: dir.path().join("out"),
            version: "abc123".into(),
            dev: false,
            malicious: false,
            binary: vec!["agent".into()],
        };
        let ctx = CliContext::new(PipelineConfig::default());
        assert_eq!(run_build_image(&args, &ctx).unwrap(), 0);
        for name in ["disk-img.zip", "update-img.zip", "update-img-test.zip", "SHA256SUMS"] {
            assert!(dir.path().join("out").join(name).is_file(), "{name}");
        }
    }

    #[test]
    fn missing_binary_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("overlay")).unwrap();
        let args = BuildImageArgs {
            binaries: dir.path().join("bin"),
            overlay: dir.path().join("overlay"),
            out: dir.path().join("out"),
            version: "abc123".into(),
            dev: true,
            malicious: false,
            binary: Vec::new(),
        };
        let ctx = CliContext::new(PipelineConfig::default());
        let err = run_build_image(&args, &ctx).unwrap_err();
        assert_eq!(crate::exit_code(&err), 8);
    }
}
