//! Engine error types and the transient-retry policy.
//!
//! Callers see four failure classes: bad input, missing data (usually mapped
//! to empty results before it ever reaches them), key conflicts (counted, not
//! raised), and backend I/O. Transient backend contention is retried with
//! bounded backoff before escalating to [`EngineError::Backend`].

use crate::config::{RETRY_ATTEMPTS, RETRY_DELAY_MS};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure classes surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown field, malformed regex, illegal configuration value.
    /// No state change has occurred.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Requested key or term does not exist. Public operations convert this
    /// to an empty result; it only escapes internal plumbing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate external key on insert. Upload paths skip and count these
    /// instead of returning the error.
    #[error("conflict: {0}")]
    Conflict(String),

    /// I/O failure against the backing store. The writer aborts and releases
    /// its lock; the framed WAL/snapshot formats keep partial mutations from
    /// becoming observable.
    #[error("backend error: {0}")]
    Backend(#[from] io::Error),
}

/// Run a backend operation, retrying transient contention
/// (`Interrupted`/`WouldBlock`) with fixed spacing before giving up.
pub(crate) fn with_retry<T>(
    what: &str,
    mut op: impl FnMut() -> io::Result<T>,
) -> Result<T, EngineError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e)
                if attempt < RETRY_ATTEMPTS
                    && matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) =>
            {
                attempt += 1;
                tracing::debug!(
                    "transient backend error during {what} (attempt {attempt}/{RETRY_ATTEMPTS}): {e}"
                );
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::warn!("{what} failed after {attempt} retries: {e}");
                }
                return Err(EngineError::Backend(e));
            }
        }
    }
}
