//! Exponential backoff for retryable backend calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BackendError, CleanupError, Result};

/// Backoff schedule for delete requests: 5 attempts, 1s doubling to a 30s cap, 10% jitter.
pub const DELETE_BACKOFF: Backoff = Backoff {
    steps: 5,
    duration: Duration::from_secs(1),
    factor: 2.0,
    jitter: 0.1,
    cap: Duration::from_secs(30),
};

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Maximum number of attempts
    pub steps: u32,
    /// Wait before the second attempt
    pub duration: Duration,
    /// Multiplier applied to each successive wait
    pub factor: f64,
    /// Fraction of each wait randomly added or removed
    pub jitter: f64,
    /// Upper bound for any single wait
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        DELETE_BACKOFF
    }
}

impl Backoff {
    /// Un-jittered wait after the `retry`-th failed attempt (0-based).
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.duration.as_secs_f64() * self.factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.cap.as_secs_f64()))
    }

    /// Jittered wait after the `retry`-th failed attempt, never above `cap`.
    pub fn delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(retry).as_secs_f64();
        let spread = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        let secs = (base * (1.0 + spread)).clamp(0.0, self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// backoff runs out of steps.
///
/// Non-retryable failures surface as [`CleanupError::Backend`] after a single
/// attempt; an exhausted budget surfaces as [`CleanupError::RetryExhausted`].
/// Cancellation interrupts any pending wait.
pub async fn retry_on_error<T, F, Fut>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BackendError>>,
{
    let mut attempts = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(CleanupError::Cancelled);
        }
        attempts += 1;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() {
            return Err(CleanupError::Backend(err));
        }
        if attempts >= backoff.steps {
            return Err(CleanupError::RetryExhausted {
                attempts,
                source: err,
            });
        }

        let delay = backoff.delay(attempts - 1, &mut rand::thread_rng());
        debug!(attempts, ?delay, error = %err, "Network error, retrying...");
        tokio::select! {
            () = cancel.cancelled() => return Err(CleanupError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
