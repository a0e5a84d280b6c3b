//! Retry orchestration for upstream calls.
//!
//! Only [`ApiError`](crate::error::ApiError)s with a configured retryable
//! status are retried; 401 fails fast so a bad credential is never
//! hammered. The wait honors the upstream's `retryDelay` hint when
//! present, otherwise a capped linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{UpstreamError, UpstreamResult};

/// Retry parameters.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempt count (first try included).
    pub max_attempts: u32,
    /// HTTP statuses worth retrying.
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_status_codes: vec![429, 500],
        }
    }
}

impl RetryPolicy {
    /// Whether an error is retryable under this policy.
    #[must_use]
    pub fn is_retryable(&self, err: &UpstreamError) -> bool {
        match err {
            UpstreamError::Api(api) if api.status != 401 => {
                self.retry_status_codes.contains(&api.status)
            }
            _ => false,
        }
    }

    /// Backoff for a zero-based attempt index: `min((n+1)·1s, 5s)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(u64::from(attempt + 1).saturating_mul(1000).min(5000))
    }
}

/// Run `op` with up to `policy.max_attempts` attempts.
///
/// Non-API errors and 401s return immediately. Retry waits prefer the
/// upstream-provided delay over the computed backoff. Cancellation is the
/// caller dropping the future (axum does this on client disconnect),
/// which aborts an in-flight sleep.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> UpstreamResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = UpstreamResult<T>>,
{
    let mut last_err = None;

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.is_retryable(&err) || attempt + 1 == policy.max_attempts {
                    return Err(err);
                }

                let delay = err.retry_delay().unwrap_or_else(|| policy.backoff(attempt));
                warn!(
                    attempt = attempt + 2,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying upstream request"
                );
                last_err = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or(UpstreamError::NoCredential))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
