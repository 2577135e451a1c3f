//! Bounded retry with exponential backoff for transient storage failures.
//!
//! Only the mutating entry points that can hit a benign race or contended I/O
//! call this; read paths propagate errors directly.

use crate::error::StorageError;
use std::time::Duration;

/// Default number of attempts for the mutating entry points.
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Base delay before the first retry; doubles per attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);

/// Run `op`, retrying up to `attempts` times on transient storage errors.
///
/// The delay doubles after each failed attempt. Permanent errors (corrupt
/// records, aborted transactions) propagate on first occurrence.
pub fn with_backoff<T, F>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, StorageError>,
{
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::debug!(attempt, error = %e, "transient storage error, retrying");
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
