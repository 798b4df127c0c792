//! Conflict-retry driver.
//!
//! Re-runs a whole transactional attempt when, and only when, the store
//! reports [`SettleError::Conflict`]. Every other outcome, success or
//! failure, is final and returned as is. The attempt closure must start
//! from scratch each time: no state read in one attempt may leak into the
//! next.

use std::time::Duration;

use rand::Rng;
use shopsettle_types::{Result, RetryConfig, SettleError};

/// Bounded retry loop keyed on the conflict signal.
#[derive(Debug, Clone)]
pub struct ConflictRetryDriver {
    config: RetryConfig,
}

impl ConflictRetryDriver {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `attempt` until it returns anything other than a conflict.
    ///
    /// The closure receives the 0-based attempt number.
    ///
    /// # Errors
    /// Whatever the final attempt returned, or
    /// [`SettleError::RetriesExhausted`] once every allowed attempt conflicted.
    pub fn run<T, F>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.config.max_attempts();
        for attempt_no in 0..max_attempts {
            match attempt(attempt_no) {
                Err(err) if err.is_conflict() => {
                    if attempt_no + 1 == max_attempts {
                        tracing::warn!(
                            attempts = max_attempts,
                            last_conflict = %err,
                            "Conflict retries exhausted"
                        );
                        break;
                    }
                    let delay = self.delay_for(attempt_no);
                    tracing::warn!(
                        attempt = attempt_no + 1,
                        max_attempts,
                        delay = ?delay,
                        reason = %err,
                        "Transaction conflict, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                outcome => return outcome,
            }
        }
        Err(SettleError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let cap = self.config.backoff(attempt);
        if self.config.jitter && !cap.is_zero() {
            rand::thread_rng().gen_range(Duration::ZERO..=cap)
        } else {
            cap
        }
    }
}

impl Default for ConflictRetryDriver {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsettle_types::{AccountId, ProductId};

    fn fast(max_retries: u32) -> ConflictRetryDriver {
        ConflictRetryDriver::new(
            RetryConfig::default()
                .with_max_retries(max_retries)
                .with_delays(0, 0),
        )
    }

    #[test]
    fn success_runs_once() {
        let mut calls = 0;
        let value = fast(5)
            .run(|_| {
                calls += 1;
                Ok(42)
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn conflicts_are_retried_until_success() {
        let mut seen = Vec::new();
        let value = fast(5)
            .run(|attempt| {
                seen.push(attempt);
                if attempt < 3 {
                    Err(SettleError::conflict("stale read"))
                } else {
                    Ok("done")
                }
            })
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn business_errors_are_not_retried() {
        let product_id = ProductId::new();
        let mut calls = 0;
        let err = fast(5)
            .run(|_| {
                calls += 1;
                Err::<(), _>(SettleError::InsufficientStock {
                    product_id,
                    requested: 2,
                    available: 1,
                })
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, SettleError::InsufficientStock { .. }));
    }

    #[test]
    fn other_errors_are_not_retried() {
        let buyer = AccountId::new();
        let mut calls = 0;
        let err = fast(5)
            .run(|_| {
                calls += 1;
                Err::<(), _>(SettleError::AccountNotFound(buyer))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err, SettleError::AccountNotFound(buyer));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut calls = 0;
        let err = fast(2)
            .run(|_| {
                calls += 1;
                Err::<(), _>(SettleError::conflict("always"))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err, SettleError::RetriesExhausted { attempts: 3 });
    }

    #[test]
    fn no_retry_policy_makes_one_attempt() {
        let driver = ConflictRetryDriver::new(RetryConfig::no_retry());
        let mut calls = 0;
        let err = driver
            .run(|_| {
                calls += 1;
                Err::<(), _>(SettleError::conflict("once"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err, SettleError::RetriesExhausted { attempts: 1 });
    }

    #[test]
    fn jittered_delay_stays_within_cap() {
        let driver = ConflictRetryDriver::new(RetryConfig::default().with_delays(4, 16));
        for attempt in 0..8 {
            let delay = driver.delay_for(attempt);
            assert!(delay <= driver.config().backoff(attempt));
        }
    }

    #[test]
    fn unjittered_delay_is_exact_backoff() {
        let driver = ConflictRetryDriver::new(
            RetryConfig::default().with_delays(1, 8).with_jitter(false),
        );
        assert_eq!(driver.delay_for(2), Duration::from_millis(4));
    }
}
