//! # Image Builder
//!
//! Assembles compiled binaries and a filesystem overlay into OS images:
//!
//! | output | contents | compression |
//! |---|---|---|
//! | `disk-img.zip` | `boot/version.txt` + root filesystem | stored |
//! | `update-img.zip` | `VERSION.TXT` + root filesystem | deflate |
//! | `update-img-test.zip` | as above, version `<version>-test` | deflate |
//!
//! The root filesystem is the overlay tree under `rootfs/`, each binary at
//! `rootfs/opt/relkit/bin/<name>`, and for `dev` images a debug login
//! entry at `rootfs/etc/shadow.d/debug-login`. A `malicious` image takes
//! `replica` from the instrumented `replica-malicious` build. Symlinks in
//! the overlay are kept as zip symlink entries pointing at their target.
//!
//! ## Reproducibility
//!
//! Entries are written in sorted path order with a fixed timestamp
//! (1980-01-01) and fixed permissions, so identical inputs and flags give
//! byte-identical images. The builder never reads the clock or the
//! environment.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use relkit_core::{ArtifactName, HashManifest, PipelineError, MANIFEST_FILE_NAME};
use relkit_crypto::sha256_file;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::CompressionMethod;

pub const DISK_IMAGE: &str = "disk-img.zip";
pub const UPDATE_IMAGE: &str = "update-img.zip";
pub const TEST_UPDATE_IMAGE: &str = "update-img-test.zip";

/// Binaries required when none are listed explicitly.
pub const DEFAULT_BINARIES: &[&str] = &["replica", "nodemanager"];

/// Binary replaced in `malicious` images.
pub const INSTRUMENTED_BINARY: &str = "replica";
const INSTRUMENTED_SUFFIX: &str = "-malicious";

const BIN_DIR: &str = "rootfs/opt/relkit/bin";
const DEBUG_LOGIN_PATH: &str = "rootfs/etc/shadow.d/debug-login";
const DEBUG_LOGIN_ENTRY: &[u8] = b"admin::0:0:99999:7:::\n";

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

/// Inputs and flags for one image build.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub binaries_dir: PathBuf,
    pub overlay_dir: PathBuf,
    pub version: String,
    /// Inject a debug login credential.
    pub dev: bool,
    /// Use the instrumented replica build.
    pub malicious: bool,
    /// Binaries that must be present in `binaries_dir`.
    pub binaries: Vec<ArtifactName>,
}

impl ImageSpec {
    /// A spec requiring [`DEFAULT_BINARIES`], no variant flags.
    pub fn new(
        binaries_dir: impl Into<PathBuf>,
        overlay_dir: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let binaries = DEFAULT_BINARIES
            .iter()
            .map(ArtifactName::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            binaries_dir: binaries_dir.into(),
            overlay_dir: overlay_dir.into(),
            version: version.into(),
            dev: false,
            malicious: false,
            binaries,
        })
    }
}

/// Paths and digests of a finished build.
#[derive(Debug, Clone)]
pub struct BuiltImages {
    pub disk_image: PathBuf,
    pub update_image: PathBuf,
    pub test_update_image: PathBuf,
    /// Digests of the three images, also written as `SHA256SUMS`.
    pub manifest: HashManifest,
}

enum Source {
    File { path: PathBuf, mode: u32 },
    Bytes(Vec<u8>),
    Symlink { target: String },
}

/// Builds the three images for an [`ImageSpec`].
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    spec: ImageSpec,
}

impl ImageBuilder {
    pub fn new(spec: ImageSpec) -> Self {
        Self { spec }
    }

    /// Build into `out_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// `MissingInput` if a required binary or the overlay directory is
    /// absent. Validation error if the version string is empty or contains
    /// whitespace.
    pub fn build(&self, out_dir: &Path) -> Result<BuiltImages, PipelineError> {
        let version = self.spec.version.trim();
        if version.is_empty() || version.chars().any(char::is_whitespace) {
            return Err(PipelineError::MissingInput(format!(
                "image version {:?} must be non-empty without whitespace",
                self.spec.version
            )));
        }
        let rootfs = self.collect_rootfs()?;
        std::fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(out_dir.display(), e))?;

        let disk_image = out_dir.join(DISK_IMAGE);
        let mut disk = BTreeMap::new();
        disk.insert(
            "boot/version.txt".to_string(),
            Source::Bytes(format!("{version}\n").into_bytes()),
        );
        write_zip(&disk_image, &disk, &rootfs, CompressionMethod::Stored)?;

        let update_image = out_dir.join(UPDATE_IMAGE);
        write_zip(
            &update_image,
            &version_entry(version),
            &rootfs,
            CompressionMethod::Deflated,
        )?;

        let test_update_image = out_dir.join(TEST_UPDATE_IMAGE);
        write_zip(
            &test_update_image,
            &version_entry(&format!("{version}-test")),
            &rootfs,
            CompressionMethod::Deflated,
        )?;

        let mut manifest = HashManifest::new();
        for (name, path) in [
            (DISK_IMAGE, &disk_image),
            (UPDATE_IMAGE, &update_image),
            (TEST_UPDATE_IMAGE, &test_update_image),
        ] {
            manifest.insert(ArtifactName::new(name)?, sha256_file(path)?)?;
        }
        let sums = out_dir.join(MANIFEST_FILE_NAME);
        std::fs::write(&sums, manifest.render()).map_err(|e| PipelineError::io(sums.display(), e))?;

        tracing::info!(
            version,
            dev = self.spec.dev,
            malicious = self.spec.malicious,
            out = %out_dir.display(),
            "built images"
        );
        Ok(BuiltImages {
            disk_image,
            update_image,
            test_update_image,
            manifest,
        })
    }

    fn collect_rootfs(&self) -> Result<BTreeMap<String, Source>, PipelineError> {
        let overlay = &self.spec.overlay_dir;
        if !overlay.is_dir() {
            return Err(PipelineError::MissingInput(format!(
                "overlay directory {}",
                overlay.display()
            )));
        }
        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(overlay).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                PipelineError::TransientIo(format!("walking {}: {e}", overlay.display()))
            })?;
            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(overlay) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())
                    .map_err(|e| PipelineError::io(entry.path().display(), e))?;
                tracing::debug!(entry = %rel, target = %target.display(), "overlay symlink");
                Source::Symlink {
                    target: target.to_string_lossy().into_owned(),
                }
            } else {
                Source::File {
                    path: entry.path().to_path_buf(),
                    mode: FILE_MODE,
                }
            };
            entries.insert(format!("rootfs/{rel}"), source);
        }

        for name in &self.spec.binaries {
            let source_name = if self.spec.malicious && name == INSTRUMENTED_BINARY {
                format!("{name}{INSTRUMENTED_SUFFIX}")
            } else {
                name.to_string()
            };
            let path = self.spec.binaries_dir.join(&source_name);
            if !path.is_file() {
                return Err(PipelineError::MissingInput(format!(
                    "binary {} not found in {}",
                    source_name,
                    self.spec.binaries_dir.display()
                )));
            }
            entries.insert(
                format!("{BIN_DIR}/{name}"),
                Source::File {
                    path,
                    mode: EXEC_MODE,
                },
            );
        }

        if self.spec.dev {
            entries.insert(
                DEBUG_LOGIN_PATH.to_string(),
                Source::Bytes(DEBUG_LOGIN_ENTRY.to_vec()),
            );
        }
        Ok(entries)
    }
}

fn version_entry(version: &str) -> BTreeMap<String, Source> {
    let mut m = BTreeMap::new();
    m.insert(
        "VERSION.TXT".to_string(),
        Source::Bytes(format!("{version}\n").into_bytes()),
    );
    m
}

fn zip_err(path: &Path, err: zip::result::ZipError) -> PipelineError {
    match err {
        zip::result::ZipError::Io(e) => PipelineError::io(path.display(), e),
        other => PipelineError::TransientIo(format!("writing {}: {other}", path.display())),
    }
}

/// Write `head` then `rootfs` entries, sorted within each group, to a
/// staging file renamed into place on success.
fn write_zip(
    out: &Path,
    head: &BTreeMap<String, Source>,
    rootfs: &BTreeMap<String, Source>,
    method: CompressionMethod,
) -> Result<(), PipelineError> {
    let partial = out.with_extension("zip.partial");
    let file = std::fs::File::create(&partial).map_err(|e| PipelineError::io(partial.display(), e))?;
    let mut writer = zip::ZipWriter::new(file);
    for (name, source) in head.iter().chain(rootfs.iter()) {
        let mode = match source {
            Source::File { mode, .. } => *mode,
            Source::Bytes(_) => FILE_MODE,
            Source::Symlink { target } => {
                let options = FileOptions::default().last_modified_time(zip::DateTime::default());
                writer
                    .add_symlink(name.as_str(), target.as_str(), options)
                    .map_err(|e| zip_err(out, e))?;
                continue;
            }
        };
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(mode);
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| zip_err(out, e))?;
        match source {
            Source::File { path, .. } => {
                let mut f =
                    std::fs::File::open(path).map_err(|e| PipelineError::io(path.display(), e))?;
                std::io::copy(&mut f, &mut writer).map_err(|e| PipelineError::io(out.display(), e))?;
            }
            Source::Bytes(bytes) => writer
                .write_all(bytes)
                .map_err(|e| PipelineError::io(out.display(), e))?,
            Source::Symlink { .. } => {}
        }
    }
    writer.finish().map_err(|e| zip_err(out, e))?;
    std::fs::rename(&partial, out).map_err(|e| PipelineError::io(out.display(), e))?;
    Ok(())
}
