use std::future::Future;
use std::time::Duration;

use mission_core::StoreError;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
#[error("failed after {attempts} attempts: {source}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

/// Bounded retry with linear backoff: attempt `n` waits `base * n` before the
/// next try, optionally capped and jittered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
            jitter: false,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt);
        let capped = match self.max_delay {
            Some(max) => linear.min(max),
            None => linear,
        };
        if !self.jitter {
            return capped;
        }
        let ceiling = capped.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(rng.gen_range(0..=ceiling))
    }

    /// Runs `operation` until it succeeds or the attempts are spent. Every
    /// failure is retried; the last one is returned with the attempt count.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        class = %err.classification(),
                        error = %err,
                        "remote call failed"
                    );
                    if attempt >= self.max_attempts {
                        return Err(RetryError {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.delay(attempt);
                    debug!(operation = label, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
