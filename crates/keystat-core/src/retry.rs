//! Retry helpers for transient failures
//!
//! Network writes to the time-series store fail for reasons that usually go
//! away on their own (restarts, brief overload). These helpers retry such
//! calls a bounded number of times with a linear backoff and hand the last
//! error back to the caller, who decides whether it is fatal.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Backoff unit; attempt `n` waits `n * BACKOFF_STEP` before the next try
pub const BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Run `f` up to `max_attempts` times, sleeping `100ms * attempt` between tries
///
/// Returns the first success, or the error from the final attempt. Errors that
/// are not transient (see [`crate::KeystatError::is_transient`]) are returned
/// immediately without further attempts.
///
/// # Usage
///
/// ```no_run
/// use keystat_core::retry::retry_with_backoff;
/// use keystat_core::Result;
///
/// async fn write_batch() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() -> Result<()> {
///     retry_with_backoff("sink_write", || write_batch(), 3).await
/// }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_attempts: usize,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt >= max_attempts || !e.is_transient() => {
                if attempt > 1 {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, e
                    );
                }
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );
                tokio::time::sleep(BACKOFF_STEP * attempt as u32).await;
                attempt += 1;
            }
        }
    }
}
