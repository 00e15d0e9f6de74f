//! Retry logic with configurable backoff strategies

use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for remote downloads and API reads
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(15),
            backoff_multiplier: 2.5,
            jitter: true,
        }
    }

    /// Same shape as [`RetryConfig::network`] with a caller-chosen budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::network()
        }
    }
}

/// Errors that can tell whether a retry might help
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for crate::error::FetchError {
    fn is_transient(&self) -> bool {
        crate::error::FetchError::is_transient(self)
    }
}

/// Retry policy that determines whether to retry and how long to wait
pub trait RetryPolicy {
    fn should_retry(&self, attempt: u32, transient: bool) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff retry policy
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: u32, transient: bool) -> bool {
        transient && attempt < self.config.max_attempts
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64;
        let exponential_delay =
            base_delay * self.config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let mut delay = Duration::from_millis(exponential_delay as u64);

        if delay > self.config.max_delay {
            delay = self.config.max_delay;
        }

        if self.config.jitter {
            // Up to 25% jitter
            let jitter = (delay.as_millis() as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay += Duration::from_millis(jitter);
        }

        delay
    }
}

/// Retry a blocking operation with a given policy
pub fn retry_with_policy<T, E, F>(
    mut operation: F,
    policy: &dyn RetryPolicy,
    operation_name: &str,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation() {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if policy.should_retry(attempt, err.is_transient()) {
                    let delay = policy.delay(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying operation after delay"
                    );
                    std::thread::sleep(delay);
                } else {
                    return Err(err);
                }
            }
        }
    }
}
