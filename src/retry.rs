//! Retry policy with linear backoff.
//!
//! A failed attempt is retried after `base_delay * n` where `n` is the
//! number of attempts made so far. Errors are classified first: only
//! transient and rate-limit failures are retried, and rate-limit failures
//! wait `rate_limit_multiplier` times longer than the normal schedule.

use crate::config::PipelineSettings;
use crate::error::{ErrorClass, Result};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// One attempt as seen by the retry loop.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Wait applied before this attempt started.
    #[serde(with = "duration_secs")]
    pub delay_before: Duration,
    /// Error text when the attempt failed.
    pub error: Option<String>,
}

/// Final result of a retried operation plus its attempt history.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: Vec<AttemptRecord>,
}

/// Linear backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    rate_limit_multiplier: u32,
}

impl RetryPolicy {
    /// Create a policy making at most `max_retries` attempts (minimum 1).
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            rate_limit_multiplier: 2,
        }
    }

    /// Build the policy from pipeline settings.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_base_delay())
            .with_rate_limit_multiplier(settings.rate_limit_multiplier)
    }

    /// Set the factor applied to the wait after a rate-limit error.
    pub fn with_rate_limit_multiplier(mut self, multiplier: u32) -> Self {
        self.rate_limit_multiplier = multiplier.max(1);
        self
    }

    /// Maximum number of attempts.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before retry number `retry` (1 for the retry after the first failure).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// Elevated wait used after a rate-limit error.
    pub fn rate_limited_backoff(&self, retry: u32) -> Duration {
        self.backoff(retry) * self.rate_limit_multiplier
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Attempts are strictly sequential.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 0;
        let mut delay = Duration::ZERO;

        loop {
            attempt += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        delay_before: delay,
                        error: None,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) => {
                    let class = e.class();
                    attempts.push(AttemptRecord {
                        attempt,
                        delay_before: delay,
                        error: Some(e.to_string()),
                    });

                    if !class.is_retryable() {
                        debug!("{}: not retrying {:?} error: {}", label, class, e);
                        return RetryOutcome {
                            result: Err(e),
                            attempts,
                        };
                    }

                    if attempt >= self.max_retries {
                        warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                        return RetryOutcome {
                            result: Err(e),
                            attempts,
                        };
                    }

                    delay = if class == ErrorClass::RateLimited {
                        self.rate_limited_backoff(attempt)
                    } else {
                        self.backoff(attempt)
                    };

                    warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                        label, attempt, self.max_retries, e, delay
                    );
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
