use std::time::Duration;

use serde::Deserialize;

use crate::error::LockError;

/// Shortest expiry a lock accepts; network backends store TTLs in whole
/// milliseconds.
pub const MIN_EXPIRATION: Duration = Duration::from_millis(1);

/// Tunables for a single lock instance.
///
/// Every lock owns its own copy; changing a manager's defaults never
/// affects locks that were already built.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kvlock::LockConfig;
///
/// let config = LockConfig::default()
///     .with_expiration(Duration::from_secs(10))
///     .with_retry_count(5);
/// assert_eq!(config.retry_delay, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// How long the key lives on the backend before it expires on its own.
    /// Must be at least [`MIN_EXPIRATION`]; locks reject shorter values
    /// with [`LockError::InvalidConfig`] before touching any backend.
    pub expiration: Duration,
    /// Attempts made by `acquire_with_retry` when the caller passes zero.
    pub retry_count: u32,
    /// Base wait between retry attempts.
    pub retry_delay: Duration,
    /// Upper bound of the random extra wait added to every retry delay.
    pub retry_jitter: Duration,
    /// Budget for `try_acquire_with_timeout` when the caller passes zero.
    pub acquire_timeout: Duration,
    /// Prefix of every generated token.
    pub value_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expiration: default_expiration(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            retry_jitter: default_retry_jitter(),
            acquire_timeout: default_acquire_timeout(),
            value_prefix: default_value_prefix(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the jitter bound. `Duration::ZERO` gives a fixed delay.
    #[must_use]
    pub fn with_retry_jitter(mut self, retry_jitter: Duration) -> Self {
        self.retry_jitter = retry_jitter;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    #[must_use]
    pub fn with_value_prefix(mut self, value_prefix: impl Into<String>) -> Self {
        self.value_prefix = value_prefix.into();
        self
    }

    /// Reject settings no backend can honour.
    pub fn validate(&self) -> Result<(), LockError> {
        if self.expiration < MIN_EXPIRATION {
            return Err(LockError::InvalidConfig(format!(
                "expiration must be at least {MIN_EXPIRATION:?}, got {:?}",
                self.expiration
            )));
        }
        Ok(())
    }
}

fn default_expiration() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_jitter() -> Duration {
    Duration::from_millis(50)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_value_prefix() -> String {
    "lock".to_owned()
}

/// Partial lock configuration, as read from a config file.
///
/// Each field present overrides the matching [`LockConfig`] field; absent
/// fields keep the base value.
///
/// # Example
///
/// ```toml
/// [lock]
/// expiration_ms = 10000
/// retry_count = 5
/// retry_delay_ms = 200
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockOverrides {
    pub expiration_ms: Option<u64>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub value_prefix: Option<String>,
}

impl LockOverrides {
    /// Merge these overrides onto `base`.
    #[must_use]
    pub fn apply(&self, base: LockConfig) -> LockConfig {
        let mut config = base;
        if let Some(ms) = self.expiration_ms {
            config.expiration = Duration::from_millis(ms);
        }
        if let Some(count) = self.retry_count {
            config.retry_count = count;
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry_jitter_ms {
            config.retry_jitter = Duration::from_millis(ms);
        }
        if let Some(ms) = self.acquire_timeout_ms {
            config.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(prefix) = &self.value_prefix {
            config.value_prefix.clone_from(prefix);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = LockConfig::default();
        assert_eq!(cfg.expiration, Duration::from_secs(30));
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.retry_delay, Duration::from_millis(100));
        assert_eq!(cfg.retry_jitter, Duration::from_millis(50));
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(5));
        assert_eq!(cfg.value_prefix, "lock");
    }

    #[test]
    fn builder_overrides_are_independent() {
        let cfg = LockConfig::default()
            .with_retry_count(7)
            .with_value_prefix("orders");
        assert_eq!(cfg.retry_count, 7);
        assert_eq!(cfg.value_prefix, "orders");
        assert_eq!(cfg.expiration, Duration::from_secs(30));
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn empty_overrides_keep_base() {
        let base = LockConfig::default().with_retry_count(9);
        assert_eq!(LockOverrides::default().apply(base.clone()), base);
    }

    #[test]
    fn overrides_from_toml() {
        let overrides: LockOverrides = toml::from_str(
            r#"
            expiration_ms = 10000
            retry_delay_ms = 200
            value_prefix = "billing"
            "#,
        )
        .expect("overrides should parse");

        let cfg = overrides.apply(LockConfig::default());
        assert_eq!(cfg.expiration, Duration::from_secs(10));
        assert_eq!(cfg.retry_delay, Duration::from_millis(200));
        assert_eq!(cfg.value_prefix, "billing");
        assert_eq!(cfg.retry_count, 3);
    }

    #[test]
    fn sub_millisecond_expiration_is_invalid() {
        assert!(LockConfig::default().validate().is_ok());
        for expiration in [Duration::ZERO, Duration::from_micros(500)] {
            let cfg = LockConfig::default().with_expiration(expiration);
            assert!(matches!(cfg.validate(), Err(LockError::InvalidConfig(_))));
        }
        let cfg = LockConfig::default().with_expiration(MIN_EXPIRATION);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_override_is_rejected() {
        let result: Result<LockOverrides, _> = toml::from_str("expiry = 5");
        assert!(result.is_err());
    }
}
