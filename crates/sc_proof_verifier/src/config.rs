//! Verifier configuration
//!
//! # Examples
//!
//! ```
//! # use sc_proof_verifier::VerifierConfig;
//! let mut config = VerifierConfig::default();
//! config.max_batch_size = 50;
//!
//! let limits = config.batch_limits();
//! assert_eq!(limits.max_size, 50);
//! ```

use crate::error::{Result, VerifierError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum age of the oldest pending request before a batch starts
pub const DEFAULT_MAX_BATCH_DELAY_MS: i64 = 5000;

/// Default pending-queue size that starts a batch
pub const DEFAULT_MAX_BATCH_SIZE: i64 = 10;

/// Default number of cached verification results
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default sleep between driver wake-ups
pub const DEFAULT_WAKE_UP_PERIOD_MS: u64 = 100;

/// Environment variable overriding [`VerifierConfig::max_batch_delay_ms`]
pub const ENV_BATCH_MAX_DELAY: &str = "SC_PROOF_BATCH_MAX_DELAY_MS";

/// Environment variable overriding [`VerifierConfig::max_batch_size`]
pub const ENV_BATCH_MAX_SIZE: &str = "SC_PROOF_BATCH_MAX_SIZE";

/// Environment variable overriding [`VerifierConfig::cache_capacity`]
pub const ENV_CACHE_CAPACITY: &str = "SC_PROOF_CACHE_CAPACITY";

/// Configuration of the asynchronous proof verifier.
///
/// Delay and size are signed because they come from operator input; negative
/// values are replaced by their defaults when the limits are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Maximum age in milliseconds of the oldest pending request
    pub max_batch_delay_ms: i64,
    /// Pending-queue size above which a batch starts immediately
    pub max_batch_size: i64,
    /// Capacity of the verification result cache
    pub cache_capacity: usize,
    /// Sleep between driver wake-ups, in milliseconds
    pub wake_up_period_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_batch_delay_ms: DEFAULT_MAX_BATCH_DELAY_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            wake_up_period_ms: DEFAULT_WAKE_UP_PERIOD_MS,
        }
    }
}

/// Effective batch trigger limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_delay: Duration,
    pub max_size: usize,
}

impl VerifierConfig {
    /// Defaults overridden by the `SC_PROOF_*` environment variables.
    ///
    /// Values that do not parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(delay) = env_value::<i64>(ENV_BATCH_MAX_DELAY) {
            config.max_batch_delay_ms = delay;
        }
        if let Some(size) = env_value::<i64>(ENV_BATCH_MAX_SIZE) {
            config.max_batch_size = size;
        }
        if let Some(capacity) = env_value::<usize>(ENV_CACHE_CAPACITY) {
            config.cache_capacity = capacity;
        }

        config
    }

    /// Configuration for tests: short wake-up period and immediate batching
    pub fn test_mode() -> Self {
        Self {
            max_batch_delay_ms: 0,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            wake_up_period_ms: 5,
        }
    }

    /// Reject settings the verifier cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(VerifierError::InvalidConfig(
                "cache_capacity must be > 0".to_string(),
            ));
        }
        if self.wake_up_period_ms == 0 {
            return Err(VerifierError::InvalidConfig(
                "wake_up_period_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the batch limits, substituting defaults for negative values
    pub fn batch_limits(&self) -> BatchLimits {
        let max_delay_ms = if self.max_batch_delay_ms < 0 {
            tracing::warn!(
                value = self.max_batch_delay_ms,
                default = DEFAULT_MAX_BATCH_DELAY_MS,
                "Negative batch delay, using default"
            );
            DEFAULT_MAX_BATCH_DELAY_MS
        } else {
            self.max_batch_delay_ms
        };

        let max_size = if self.max_batch_size < 0 {
            tracing::warn!(
                value = self.max_batch_size,
                default = DEFAULT_MAX_BATCH_SIZE,
                "Negative batch size, using default"
            );
            DEFAULT_MAX_BATCH_SIZE
        } else {
            self.max_batch_size
        };

        BatchLimits {
            max_delay: Duration::from_millis(max_delay_ms as u64),
            max_size: max_size as usize,
        }
    }

    pub fn wake_up_period(&self) -> Duration {
        Duration::from_millis(self.wake_up_period_ms)
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = VerifierConfig::default().batch_limits();
        assert_eq!(limits.max_delay, Duration::from_millis(5000));
        assert_eq!(limits.max_size, 10);
    }

    #[test]
    fn test_negative_values_fall_back() {
        let config = VerifierConfig {
            max_batch_delay_ms: -1,
            max_batch_size: -20,
            ..VerifierConfig::default()
        };
        let limits = config.batch_limits();
        assert_eq!(limits.max_delay, Duration::from_millis(5000));
        assert_eq!(limits.max_size, 10);
    }

    #[test]
    fn test_zero_is_valid() {
        let config = VerifierConfig {
            max_batch_delay_ms: 0,
            max_batch_size: 0,
            ..VerifierConfig::default()
        };
        let limits = config.batch_limits();
        assert_eq!(limits.max_delay, Duration::ZERO);
        assert_eq!(limits.max_size, 0);
    }

    #[test]
    fn test_validate() {
        assert!(VerifierConfig::default().validate().is_ok());
        assert!(VerifierConfig::test_mode().validate().is_ok());

        let config = VerifierConfig {
            cache_capacity: 0,
            ..VerifierConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VerifierError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_BATCH_MAX_DELAY, "250");
        std::env::set_var(ENV_BATCH_MAX_SIZE, "not a number");

        let config = VerifierConfig::from_env();
        assert_eq!(config.max_batch_delay_ms, 250);
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);

        std::env::remove_var(ENV_BATCH_MAX_DELAY);
        std::env::remove_var(ENV_BATCH_MAX_SIZE);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{"max_batch_size": 3}"#).unwrap();
        assert_eq!(config.max_batch_size, 3);
        assert_eq!(config.max_batch_delay_ms, DEFAULT_MAX_BATCH_DELAY_MS);
    }
}
