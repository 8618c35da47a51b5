//! Bounded retry of storage conflicts
//!
//! A `StorageConflict` means the unit of work was rolled back in full, so the
//! whole unit may be re-run. Anything else is returned on the first failure.

use crate::types::LedgerError;
use std::thread;
use std::time::Duration;
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Run `f`, re-running it up to `max_retries` more times on `StorageConflict`
///
/// Waits with exponential backoff between attempts.
pub fn with_conflict_retry<T, F>(
    max_retries: u32,
    operation: &str,
    mut f: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Result<T, LedgerError>,
{
    let mut attempt = 0;
    let mut delay = INITIAL_BACKOFF;

    loop {
        match f() {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "storage conflict, retrying"
                );
                thread::sleep(delay);
                delay = (delay * 2).min(MAX_BACKOFF);
            }
            other => return other,
        }
    }
}
