use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use kvlock::{LockConfig, LockOverrides};
use kvlock_redis::RedisConfig;
use serde::Deserialize;

/// Backend used when neither the command line nor the file names one.
pub const DEFAULT_BACKEND: &str = "redis://127.0.0.1:6379";

/// Contents of the optional TOML configuration file.
///
/// ```toml
/// backends = ["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"]
/// namespace = "billing"
/// pool_size = 4
///
/// [lock]
/// expiration_ms = 10000
/// retry_count = 5
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub backends: Vec<String>,
    pub namespace: Option<String>,
    pub pool_size: Option<usize>,
    pub connection_timeout_ms: Option<u64>,
    #[serde(default)]
    pub lock: LockOverrides,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Backend URLs, preferring the ones given on the command line.
    pub fn backend_urls(&self, from_flags: &[String]) -> Vec<String> {
        if !from_flags.is_empty() {
            from_flags.to_vec()
        } else if !self.backends.is_empty() {
            self.backends.clone()
        } else {
            vec![DEFAULT_BACKEND.to_owned()]
        }
    }

    /// Connection settings shared by every backend.
    pub fn redis_template(&self, namespace_flag: Option<&str>) -> RedisConfig {
        let mut template = RedisConfig::default();
        if let Some(ns) = namespace_flag.or(self.namespace.as_deref()) {
            template = template.with_namespace(ns);
        }
        if let Some(size) = self.pool_size {
            template = template.with_pool_size(size);
        }
        if let Some(ms) = self.connection_timeout_ms {
            template = template.with_connection_timeout(Duration::from_millis(ms));
        }
        template
    }

    pub fn lock_defaults(&self) -> LockConfig {
        self.lock.apply(LockConfig::default())
    }
}
