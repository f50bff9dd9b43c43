//! Bounded retry with backoff for backend calls

use std::future::Future;
use std::time::Duration;

use super::BackendError;

/// Base delay between transient-failure retries. Doubles per attempt.
const BASE_BACKOFF_MS: u64 = 250;

/// Run a backend call up to `max_attempts` times.
///
/// Transient failures back off exponentially; rate-limit responses wait
/// the server-provided delay instead. Permanent failures are surfaced
/// immediately without consuming further attempts.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut call: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err @ BackendError::Permanent(_)) => return Err(err),
            Err(err) => {
                let delay = match &err {
                    BackendError::RateLimited { retry_after_secs } => {
                        Duration::from_secs(*retry_after_secs)
                    }
                    _ => Duration::from_millis(BASE_BACKOFF_MS << attempt),
                };

                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    "Backend call failed, backing off"
                );

                last_err = Some(err);
                if attempt + 1 < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| BackendError::Transient("no attempts made".to_string())))
}
