//! Retry with exponential backoff for transient store failures
//!
//! Only errors whose [`ProbeError::is_transient`] is true are retried; hard
//! errors and resource exhaustion return immediately so the caller can pick
//! a different strategy.

use std::future::Future;
use std::time::Duration;

use crate::store::ProbeError;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

/// Run `operation` up to `1 + retries` times
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "exists probe")
/// * `retries` - Extra attempts after the first failure
/// * `operation` - Async closure issuing the request
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    retries: u32,
    mut operation: F,
) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Store request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_transient() && attempt <= retries => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
            Err(err) => return Err(err),
        }
    }
}
