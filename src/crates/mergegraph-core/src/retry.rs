//! Retry policies for collaborator calls
//!
//! The engine never retries whole stages. Collaborators (LLM, web search) wrap
//! their own calls in [`with_retry`] so a transient failure is retried before it
//! surfaces to the stage as a [`StageError::Collaborator`](crate::StageError).
//!
//! The pipeline default is [`RetryPolicy::fixed`]: sleep once, retry once.
//!
//! ```text
//! attempt 1 ──fail──▶ sleep(delay) ──▶ attempt 2 ──fail──▶ error surfaces
//!     │                                    │
//!     └──ok──▶ result                      └──ok──▶ result
//! ```
//!
//! ```rust
//! use mergegraph_core::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::fixed(Duration::from_secs(10));
//! assert_eq!(policy.max_attempts, 2);
//! assert_eq!(policy.calculate_delay(0), Duration::from_secs(10));
//! assert!(!policy.should_retry(2));
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times, and how far apart, to attempt an operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Delay before the first retry, in seconds
    pub initial_interval: f64,

    /// Multiplier for the delay after each retry
    pub backoff_factor: f64,

    /// Upper bound on any single delay, in seconds
    pub max_interval: f64,

    /// Whether to randomize each delay (0.5x to 1.5x)
    pub jitter: bool,
}

impl RetryPolicy {
    /// Exponential policy with the given attempt budget
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }

    /// One retry after a fixed sleep
    pub fn fixed(delay: Duration) -> Self {
        let seconds = delay.as_secs_f64();
        Self {
            max_attempts: 2,
            initial_interval: seconds,
            backoff_factor: 1.0,
            max_interval: seconds,
            jitter: false,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO).with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::ZERO;
        }

        let base = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval).max(0.0);

        let delay = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}

/// Run `operation` under `policy`, retrying every failure
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(policy, operation, |_| true).await
}

/// Run `operation` under `policy`, retrying only failures accepted by `retryable`
pub async fn with_retry_if<F, Fut, T, E, P>(policy: &RetryPolicy, operation: F, retryable: P) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !retryable(&error) || !policy.should_retry(attempt) {
                    if attempt > 1 {
                        warn!(attempts = attempt, error = %error, "Giving up after retries");
                    }
                    return Err(error);
                }

                let delay = policy.calculate_delay(attempt - 1);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
