//! Stage-level retry.
//!
//! A stage is rerun from scratch on `TransientIo` only. Every stage is
//! safe to repeat with identical inputs (create-if-absent uploads,
//! compare-and-swap markers), so a rerun cannot double-apply anything.

use relkit_core::PipelineError;

/// Run `stage`, retrying up to `retries` extra times on transient I/O.
pub fn retry_transient<T>(
    retries: u32,
    stage: &str,
    mut run: impl FnMut() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let mut attempt = 0u32;
    loop {
        match run() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind().is_retryable() && attempt < retries => {
                attempt += 1;
                tracing::warn!(stage, attempt, retries, error = %e, "transient failure, retrying stage");
            }
            Err(e) => return Err(e),
        }
    }
}
