// Segment retry backoff: exponential delay with a cap, interruptible by the
// rendition's cancellation token.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::DumpError;

/// Configuration for retry delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry. Each further retry doubles it.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 64ms doubling up to 1024ms: five backoff levels.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(64),
            max_delay: Duration::from_millis(64 * 16),
        }
    }
}

impl RetryPolicy {
    /// Compute the delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt is computed with a checked shift so attempts >= 32 saturate.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Tracks the retries of one operation.
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of waits performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Sleeps for the next delay.
    ///
    /// Returns [`DumpError::Cancelled`] if the token is cancelled before,
    /// during or right after the wait.
    pub async fn wait(&mut self, token: &CancellationToken) -> Result<(), DumpError> {
        if token.is_cancelled() {
            return Err(DumpError::Cancelled);
        }

        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt += 1;
        debug!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DumpError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        if token.is_cancelled() {
            return Err(DumpError::Cancelled);
        }
        Ok(())
    }
}
