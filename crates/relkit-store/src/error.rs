//! Errors raised by object store backends.

use relkit_core::{ContentDigest, PipelineError, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Key is empty, absolute, or has an empty, `.`/`..`, or hidden segment.
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    /// An immutable key already holds different bytes.
    #[error("conflict at {key}: stored {existing}, attempted {attempted}")]
    Conflict {
        key: String,
        existing: ContentDigest,
        attempted: ContentDigest,
    },

    /// Another writer held the key's lock for too long.
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        Self::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => ValidationError::InvalidLocation(key).into(),
            StoreError::Conflict {
                key,
                existing,
                attempted,
            } => PipelineError::Conflict {
                location: key,
                existing,
                attempted,
            },
            StoreError::LockTimeout(key) => {
                PipelineError::TransientIo(format!("lock timeout on {key}"))
            }
            StoreError::Io { key, source } => PipelineError::io(key, source),
        }
    }
}
