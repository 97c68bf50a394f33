//! # Pipeline Configuration
//!
//! Settings shared by every stage. Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. A YAML file (the CLI's global `--config`).
//! 3. Environment variables (`RELKIT_STORE_ROOT`, `RELKIT_LOOK_BACK`,
//!    `RELKIT_BLOCK_ON_MISMATCH`, `RELKIT_STAGE_RETRIES`).
//! 4. Explicit CLI flags, applied by the caller.
//!
//! ```yaml
//! store_root: /mnt/artifacts
//! look_back_window: 50
//! block_on_mismatch: true
//! download_base_url: https://download.example.org/
//! ```

use std::path::{Path, PathBuf};

use relkit_core::MarkerTag;
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable overriding [`PipelineConfig::store_root`].
pub const ENV_STORE_ROOT: &str = "RELKIT_STORE_ROOT";
/// Environment variable overriding [`PipelineConfig::look_back_window`].
pub const ENV_LOOK_BACK: &str = "RELKIT_LOOK_BACK";
/// Environment variable overriding [`PipelineConfig::block_on_mismatch`].
pub const ENV_BLOCK_ON_MISMATCH: &str = "RELKIT_BLOCK_ON_MISMATCH";
/// Environment variable overriding [`PipelineConfig::stage_retries`].
pub const ENV_STAGE_RETRIES: &str = "RELKIT_STAGE_RETRIES";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },
}

/// Settings for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root directory of the filesystem object store.
    pub store_root: PathBuf,
    /// How many first-parent commits "latest" resolution may walk.
    pub look_back_window: usize,
    /// Whether a determinism mismatch is a blocking error.
    pub block_on_mismatch: bool,
    /// Maximum concurrent downloads per fetch request.
    pub fetch_concurrency: usize,
    /// Extra attempts for a stage that fails with a transient I/O error.
    pub stage_retries: u32,
    /// Environment variable holding the hex signing seed.
    pub signing_key_env: String,
    /// Public base URL the store is served under, for release descriptors.
    pub download_base_url: Option<Url>,
    /// Marker tag advanced when none is given.
    pub default_tag: MarkerTag,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("artifacts"),
            look_back_window: 100,
            block_on_mismatch: false,
            fetch_concurrency: 8,
            stage_retries: 0,
            signing_key_env: relkit_crypto::DEFAULT_SIGNING_KEY_ENV.to_string(),
            download_base_url: None,
            default_tag: MarkerTag::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Load from `path` if given (defaults otherwise), then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(root) = lookup(ENV_STORE_ROOT) {
            self.store_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_LOOK_BACK) {
            self.look_back_window = parse_var(ENV_LOOK_BACK, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BLOCK_ON_MISMATCH) {
            self.block_on_mismatch = parse_bool(ENV_BLOCK_ON_MISMATCH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STAGE_RETRIES) {
            self.stage_retries = parse_var(ENV_STAGE_RETRIES, &raw)?;
        }
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw.to_string(),
        }),
    }
}
