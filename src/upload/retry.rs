//! Retry logic with exponential backoff for uploads

use std::fmt::Display;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Backoff multiplier (typically 2.0)
    pub multiplier: f64,
    /// Upper bound on a single delay; None leaves it uncapped
    pub max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    /// Initial attempt plus 12 retries waiting 2, 4, ... 4096 seconds
    fn default() -> Self {
        Self {
            max_retries: 12,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without waiting
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: None,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let backoff = self.initial_backoff.mul_f64(self.multiplier.powi(exponent));
        match self.max_backoff {
            Some(max) => backoff.min(max),
            None => backoff,
        }
    }
}

/// Waits between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays instead of waiting
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Every attempt failed
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Execute an operation with retry logic. The operation receives the 1-based
/// attempt number.
pub fn with_retry<T, E, F>(
    mut operation: F,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    context: &str,
) -> Result<T, Exhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} retries", context, attempt - 1);
                }
                return Ok(result);
            }
            Err(err) if attempt < max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    "Error in {}. Attempt {}/{}: {}. Sleeping for {:?}",
                    context, attempt, max_attempts, err, backoff
                );
                sleeper.sleep(backoff);
                attempt += 1;
            }
            Err(err) => {
                error!("All {} attempts failed for {}: {}", max_attempts, context, err);
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
        }
    }
}
