// src/services/retry.rs
use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::errors::AnalyzerError;

/// Bounded attempts with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn no_delay(mut self) -> Self {
        self.base_delay = Duration::ZERO;
        self
    }

    /// Wait before retrying after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi((attempt - 1) as i32);
        let ms = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(ms as u64)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, AnalyzerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AnalyzerError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        label, attempt, max_attempts, delay, e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
