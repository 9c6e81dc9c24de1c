use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// A connection to one key-value store instance used for coordination.
///
/// Implementations must be `Send + Sync` and safe for concurrent access;
/// one handle is shared by every lock built on it. All three mutating
/// operations must be atomic on the store side, evaluated in a single
/// round trip.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Stable identifier used in logs and quorum failure reports.
    fn name(&self) -> &str;

    /// Set `key = value` with expiry `ttl` only if `key` is absent.
    /// Returns `true` if this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, LockError>;

    /// Delete `key` only if its current value equals `expected`.
    /// Returns the number of keys deleted (0 or 1).
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<u64, LockError>;

    /// Reset the expiry of `key` to `ttl` only if its current value equals
    /// `expected`. Returns the number of keys updated (0 or 1).
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<u64, LockError>;

    /// Read the current value of `key`. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), LockError>;
}

/// Shared handle to a backend, as held by locks and the manager.
pub type SharedBackend = Arc<dyn LockBackend>;
