//! Retry with exponential backoff
//!
//! Used when a block mover rolls a structure back and restores the
//! original blocks.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries with growing delay; later retries wait `max_delay`
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier applied per retry
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier (at least 1.0)
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult.max(1.0);
        self
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Next delay, or `None` once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_retries {
            return None;
        }
        let base = self.config.initial_delay.as_secs_f64();
        let scaled = base * self.config.multiplier.powi(self.attempt as i32);
        let capped = scaled.min(self.config.max_delay.as_secs_f64());
        self.attempt += 1;
        Some(Duration::from_secs_f64(capped))
    }

    /// Retries handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Runs fallible operations with retries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run a synchronous operation until it succeeds.
    ///
    /// Delays grow for the first `max_retries` retries; every later retry
    /// waits `max_delay`.
    pub async fn run_until_ok<F, T, E>(&self, what: &str, mut operation: F) -> T
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut backoff = ExponentialBackoff::new(self.config.clone());
        let mut failures = 0u32;
        loop {
            match operation() {
                Ok(value) => return value,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = match backoff.next_delay() {
                        Some(delay) => {
                            warn!(
                                operation = %what,
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Retrying after failure"
                            );
                            delay
                        }
                        None => {
                            if failures == self.config.max_retries.saturating_add(1) {
                                error!(
                                    operation = %what,
                                    attempt = failures,
                                    error = %e,
                                    "Retry budget spent, retrying at maximum delay"
                                );
                            }
                            self.config.max_delay
                        }
                    };
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default()
            .max_retries(3)
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0);
        let mut backoff = ExponentialBackoff::new(config);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default()
            .max_retries(10)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5));
        let mut backoff = ExponentialBackoff::new(config);
        let last = std::iter::from_fn(|| backoff.next_delay()).last().unwrap();
        assert_eq!(last, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recovers_from_transient_failures() {
        let policy = RetryPolicy::new(RetryConfig::default().max_retries(3));
        let mut attempts = 0;
        let value = policy
            .run_until_ok("restore", || {
                attempts += 1;
                if attempts < 3 {
                    Err("busy")
                } else {
                    Ok(attempts)
                }
            })
            .await;
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_continues_past_retry_budget() {
        let config = RetryConfig::default()
            .max_retries(2)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_secs(1));
        let policy = RetryPolicy::new(config);
        let started = tokio::time::Instant::now();
        let mut attempts = 0;
        policy
            .run_until_ok("restore", || {
                attempts += 1;
                if attempts <= 6 {
                    Err("gone")
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(attempts, 7);
        // 10ms + 20ms, then four retries at the 1s cap
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4030));
        assert!(elapsed < Duration::from_millis(4100));
    }
}
