//! Exponential backoff around a single network call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolrelay_core::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(350),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(2_500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff_delay_for_attempt(&self, retry: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64;
        let factor = self.multiplier.max(1.0).powi(retry.min(31) as i32);
        let max = self.max_backoff.as_millis() as f64;
        let delay_ms = (base * factor).min(max).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of retries.
///
/// `op` receives the 0-based attempt number. Cancellation is checked before
/// every attempt and raced against every backoff sleep.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0_u32;
    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_retries {
                    return Err(error);
                }

                let delay = policy.backoff_delay_for_attempt(attempt);
                tracing::warn!(
                    target_call = label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                attempt += 1;

                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
