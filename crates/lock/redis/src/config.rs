use std::time::Duration;

use serde::Deserialize;

/// Connection settings for one Redis lock backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub url: String,

    /// Namespace prepended to every lock key (`namespace:key`). `None`
    /// stores keys exactly as given.
    pub namespace: Option<String>,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection, in milliseconds.
    pub connection_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            namespace: None,
            pool_size: 10,
            connection_timeout_ms: 5_000,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.namespace, None);
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: RedisConfig = toml::from_str(
            r#"
            url = "redis://cache:6380"
            pool_size = 4
            "#,
        )
        .expect("config should parse");
        assert_eq!(cfg.url, "redis://cache:6380");
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.connection_timeout_ms, 5_000);
    }

    #[test]
    fn builder_sets_fields() {
        let cfg = RedisConfig::new("redis://a:1")
            .with_namespace("svc")
            .with_pool_size(2)
            .with_connection_timeout(Duration::from_millis(250));
        assert_eq!(cfg.namespace.as_deref(), Some("svc"));
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.connection_timeout_ms, 250);
    }
}
