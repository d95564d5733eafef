//! Retry helpers with exponential backoff and jitter.
//!
//! Only errors classified `Retriable` are retried. Backoff sleeps are
//! interrupted by request cancellation.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first try.
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ratio_pct: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    #[must_use]
    pub fn backoff_delay(self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(30);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << pow)
            .min(self.max_delay_ms);
        let jitter_pct = u64::from(self.jitter_ratio_pct.min(100));
        if jitter_pct == 0 || capped == 0 {
            return Duration::from_millis(capped);
        }

        // Symmetric jitter in [-range, +range], clamped to [0, max_delay_ms].
        let range = capped.saturating_mul(jitter_pct) / 100;
        let unit = jitter_seed(attempt) % 1001;
        let spread = range.saturating_mul(unit) / 500;
        let jittered = capped.saturating_sub(range).saturating_add(spread);
        Duration::from_millis(jittered.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter_ratio_pct: 20,
        }
    }
}

/// Retry a fallible async operation with backoff + jitter.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _| {}).await
}

/// Retry with a callback invoked before each retry sleep.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error.with_metadata("attempts", attempt.to_string()));
                }

                on_retry(attempt, &error);
                let delay = policy.backoff_delay(attempt);
                tokio::select! {
                    () = ctx.cancelled() => {
                        return Err(ErrorEnvelope::cancelled("operation cancelled")
                            .with_metadata("operation", operation));
                    },
                    () = tokio::time::sleep(delay) => {},
                }
            },
        }
    }
}

fn jitter_seed(attempt: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    nanos ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
