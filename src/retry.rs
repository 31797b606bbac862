use std::future::Future;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Spacing between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `min(base * 2^retry, max) + jitter(0..base)`.
    Exponential,
    /// Always `base`, no jitter.
    Fixed,
}

/// Retry budget and spacing.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 5,
            max_delay_secs: 60,
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryConfig {
    /// `attempts` total tries spaced exactly `delay_secs` apart.
    pub fn fixed(attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_retries: attempts.saturating_sub(1),
            base_delay_secs: delay_secs,
            max_delay_secs: delay_secs,
            backoff: Backoff::Fixed,
        }
    }

    /// Pause before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> std::time::Duration {
        if self.backoff == Backoff::Fixed {
            return std::time::Duration::from_secs(self.base_delay_secs);
        }
        let exp_delay = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_secs);
        let jitter = if self.base_delay_secs > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_secs)
        } else {
            0
        };
        std::time::Duration::from_secs(capped + jitter)
    }
}

/// Run `operation` until it succeeds, `classifier` says `Abort`, or the
/// budget in `config` is spent. The last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if classifier(&e) == RetryAction::Abort || attempt + 1 >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed, retrying in {}s: {}",
                    attempt + 1,
                    total_attempts,
                    delay.as_secs(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
