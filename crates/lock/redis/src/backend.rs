//! Redis-backed lock backend.
//!
//! Each [`RedisBackend`] wraps a `deadpool-redis` pool for one Redis
//! instance. Claiming, releasing and refreshing run as Lua scripts so every
//! compare-and-act step executes atomically on the server:
//!
//! - **claim**: `SET key token NX PX ttl`
//! - **release**: `GET key == token` then `DEL key`
//! - **refresh**: `GET key == token` then `PEXPIRE key ttl`
//!
//! # Guarantees
//!
//! Against a single standalone instance a [`kvlock::SingleLock`] gives full
//! mutual exclusion as long as the critical section is shorter than the
//! expiry. Replication in Sentinel or Cluster deployments is asynchronous,
//! so a failover right after a claim can lose the key. To survive the loss
//! of individual instances use a [`kvlock::QuorumLock`] over several
//! independent instances (see [`connect_all`]).
//!
//! # Example
//!
//! ```ignore
//! use kvlock::{DistributedLock, LockConfig, LockContext, LockManager};
//! use kvlock_redis::{RedisConfig, connect_all};
//!
//! let backends = connect_all(
//!     &["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"],
//!     &RedisConfig::default(),
//! )?;
//! let manager = LockManager::new(backends)?;
//! let lock = manager.new_quorum_lock("my_redlock", LockConfig::default());
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, RedisError, Script};

use kvlock::{LockBackend, LockError, SharedBackend};

use crate::config::RedisConfig;
use crate::key_render::{display_name, render_key};
use crate::scripts;

/// Redis implementation of [`LockBackend`].
pub struct RedisBackend {
    pool: Pool,
    name: String,
    namespace: Option<String>,
    acquire: Script,
    release: Script,
    extend: Script,
}

impl RedisBackend {
    /// Create a new `RedisBackend` from the provided configuration.
    ///
    /// No connection is opened until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, LockError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout()))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| LockError::Connection(e.to_string()))?
            .map_err(|e| LockError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            name: display_name(&config.url),
            namespace: config.namespace.clone(),
            acquire: Script::new(scripts::LOCK_ACQUIRE),
            release: Script::new(scripts::LOCK_RELEASE),
            extend: Script::new(scripts::LOCK_EXTEND),
        })
    }

    /// Build the full Redis key for a lock.
    fn redis_key(&self, key: &str) -> String {
        render_key(self.namespace.as_deref(), key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, LockError> {
        self.pool
            .get()
            .await
            .map_err(|e| LockError::Connection(format!("{}: {e}", self.name)))
    }

    fn classify(&self, e: &RedisError) -> LockError {
        let message = format!("{}: {e}", self.name);
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
        {
            LockError::Connection(message)
        } else {
            LockError::Backend(message)
        }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl LockBackend for RedisBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn().await?;
        let result: i64 = self
            .acquire
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.classify(&e))?;

        Ok(result == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<u64, LockError> {
        let mut conn = self.conn().await?;
        let deleted: u64 = self
            .release
            .key(self.redis_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.classify(&e))?;

        Ok(deleted)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<u64, LockError> {
        let mut conn = self.conn().await?;
        let updated: u64 = self
            .extend
            .key(self.redis_key(key))
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.classify(&e))?;

        Ok(updated)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn
            .get(self.redis_key(key))
            .await
            .map_err(|e| self.classify(&e))?;

        Ok(value)
    }

    async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.classify(&e))?;
        Ok(())
    }
}

/// Build one backend per URL, sharing every other setting of `template`.
///
/// # Errors
///
/// Returns the first pool construction error.
pub fn connect_all<S: AsRef<str>>(
    urls: &[S],
    template: &RedisConfig,
) -> Result<Vec<SharedBackend>, LockError> {
    urls.iter()
        .map(|url| {
            let config = RedisConfig {
                url: url.as_ref().to_owned(),
                ..template.clone()
            };
            let backend = RedisBackend::new(&config)?;
            tracing::debug!(backend = %backend.name, "redis lock backend configured");
            Ok(Arc::new(backend) as SharedBackend)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name_hides_credentials() {
        let backend = RedisBackend::new(&RedisConfig::new("redis://user:pw@127.0.0.1:6390"))
            .expect("pool creation should succeed");
        assert_eq!(backend.name(), "redis://127.0.0.1:6390");
    }

    #[test]
    fn connect_all_builds_one_backend_per_url() {
        let backends = connect_all(
            &["redis://127.0.0.1:6390", "redis://127.0.0.1:6391"],
            &RedisConfig::default().with_namespace("svc"),
        )
        .expect("pool creation should succeed");
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, ["redis://127.0.0.1:6390", "redis://127.0.0.1:6391"]);
    }

    #[test]
    fn invalid_url_is_a_connection_error() {
        let result = RedisBackend::new(&RedisConfig::new("not a url"));
        assert!(matches!(result, Err(LockError::Connection(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let config = RedisConfig::new("redis://127.0.0.1:1")
            .with_connection_timeout(Duration::from_millis(200));
        let backend = RedisBackend::new(&config).expect("pool creation should succeed");
        let result = backend.ping().await;
        assert!(matches!(result, Err(LockError::Connection(_))));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use kvlock::{DistributedLock, LockConfig, LockContext, SingleLock};

    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig::new(
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
        )
        .with_namespace(format!("kvlock-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn backend_conformance() {
        let backend = RedisBackend::new(&test_config()).expect("pool creation should succeed");
        kvlock::testing::run_backend_conformance_tests(&backend)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn single_lock_round_trip() {
        let backend: SharedBackend =
            Arc::new(RedisBackend::new(&test_config()).expect("pool creation should succeed"));
        let ctx = LockContext::new();
        let a = SingleLock::new(Arc::clone(&backend), "job:42", LockConfig::default());
        let b = SingleLock::new(Arc::clone(&backend), "job:42", LockConfig::default());

        assert!(a.acquire(&ctx).await.unwrap());
        assert!(!b.acquire(&ctx).await.unwrap());
        assert!(matches!(
            b.release(&ctx).await,
            Err(LockError::NotHeld { .. })
        ));
        a.refresh(&ctx).await.unwrap();
        a.release(&ctx).await.unwrap();
        assert!(b.acquire(&ctx).await.unwrap());
        b.release(&ctx).await.unwrap();
    }
}
