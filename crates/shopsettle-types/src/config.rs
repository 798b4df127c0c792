//! Configuration types for the settlement engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SettleError, constants};

/// Conflict-retry policy.
///
/// `max_retries` counts re-runs after the first attempt, so `0` means a
/// single attempt and no retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Randomize each delay uniformly in `[0, delay]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: constants::DEFAULT_RETRY_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts the policy allows (first run plus retries).
    /// Saturates for `u32::MAX` retries, which `SettlementConfig::validate`
    /// rejects.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Un-jittered backoff before retry number `attempt` (0-based):
    /// `base << attempt`, capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Top-level settlement engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub retry: RetryConfig,
    /// Maximum distinct purchase lines per request.
    pub max_lines: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_lines: constants::DEFAULT_MAX_PURCHASE_LINES,
        }
    }
}

impl SettlementConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    ///
    /// # Errors
    /// [`SettleError::Configuration`] if the document is malformed or fails
    /// [`SettlementConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SettleError::Configuration(format!("invalid config document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_lines == 0 {
            return Err(SettleError::Configuration(
                "max_lines must be at least 1".into(),
            ));
        }
        if self.retry.max_retries == u32::MAX {
            return Err(SettleError::Configuration(format!(
                "retry.max_retries must be below {}",
                u32::MAX
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SettleError::Configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SettlementConfig::default();
        assert_eq!(cfg.retry.max_retries, 10);
        assert_eq!(cfg.retry.max_attempts(), 11);
        assert_eq!(cfg.max_lines, 1_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let retry = RetryConfig::default().with_delays(2, 20);
        assert_eq!(retry.backoff(0), Duration::from_millis(2));
        assert_eq!(retry.backoff(1), Duration::from_millis(4));
        assert_eq!(retry.backoff(3), Duration::from_millis(16));
        assert_eq!(retry.backoff(4), Duration::from_millis(20));
        assert_eq!(retry.backoff(200), Duration::from_millis(20));
    }

    #[test]
    fn no_retry_is_single_attempt() {
        assert_eq!(RetryConfig::no_retry().max_attempts(), 1);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg = SettlementConfig::from_json_str(r#"{"retry": {"max_retries": 3}}"#).unwrap();
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.max_delay_ms, constants::DEFAULT_RETRY_MAX_DELAY_MS);
        assert_eq!(cfg.max_lines, constants::DEFAULT_MAX_PURCHASE_LINES);
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = SettlementConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SettleError::Configuration(_)));
    }

    #[test]
    fn inverted_delays_rejected() {
        let err = SettlementConfig::from_json_str(
            r#"{"retry": {"base_delay_ms": 100, "max_delay_ms": 10}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SettleError::Configuration(_)));
    }

    #[test]
    fn unrepresentable_retry_count_rejected() {
        let json = format!(r#"{{"retry": {{"max_retries": {}}}}}"#, u32::MAX);
        let err = SettlementConfig::from_json_str(&json).unwrap_err();
        assert!(matches!(err, SettleError::Configuration(_)));

        let largest = SettlementConfig {
            retry: RetryConfig::default().with_max_retries(u32::MAX - 1),
            ..SettlementConfig::default()
        };
        assert!(largest.validate().is_ok());
        assert_eq!(largest.retry.max_attempts(), u32::MAX);
    }

    #[test]
    fn zero_max_lines_rejected() {
        let err = SettlementConfig::from_json_str(r#"{"max_lines": 0}"#).unwrap_err();
        assert!(matches!(err, SettleError::Configuration(_)));
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = SettlementConfig {
            retry: RetryConfig::default().with_max_retries(7).with_jitter(false),
            max_lines: 12,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back = SettlementConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
