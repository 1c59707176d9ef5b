//! Bounded retry with linear backoff
//!
//! Used for clip downloads. Errors that retrying cannot fix (configuration,
//! directory creation) are returned immediately.

use cvb_common::{Error, Result};
use std::time::Duration;

/// Whether another attempt could succeed
pub fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::Io(_) | Error::Storage(_))
}

/// Run `operation` up to `attempts` times, sleeping `backoff_ms * attempt`
/// between attempts.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "clip download")
/// * `attempts` - Maximum number of attempts (0 is treated as 1)
/// * `backoff_ms` - Base delay between attempts
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    attempts: u32,
    backoff_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if attempt < attempts && is_retryable(&err) => {
                let delay_ms = backoff_ms * attempt as u64;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms,
                    error = %err,
                    "Operation failed, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed: attempts exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}
