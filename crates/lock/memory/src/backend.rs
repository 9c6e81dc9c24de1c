use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use kvlock::{LockBackend, LockError};

/// Internal entry representing a stored key.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Mode for simulating an unhealthy backend.
#[derive(Debug, Clone, Default)]
pub enum FailureMode {
    /// Never fail.
    #[default]
    None,
    /// Fail every N calls.
    EveryN(usize),
    /// Fail the first N calls.
    FirstN(usize),
    /// Always fail, as if the store were unreachable.
    Always,
}

/// In-memory [`LockBackend`] backed by a [`DashMap`].
///
/// Expiry is lazy: an expired entry is dropped by the next operation that
/// touches its key. Clones share the same map, so a clone can be kept by a
/// test to inspect or tamper with the state a lock sees.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    entries: Arc<DashMap<String, Entry>>,
    failure_mode: Arc<Mutex<FailureMode>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryBackend {
    /// Create an empty backend with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(DashMap::new()),
            failure_mode: Arc::new(Mutex::new(FailureMode::None)),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every call by `delay` before it touches the map.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_failure_mode(self, mode: FailureMode) -> Self {
        self.set_failure_mode(mode);
        self
    }

    /// Change the failure mode; affects every clone.
    pub fn set_failure_mode(&self, mode: FailureMode) {
        *self.failure_mode.lock() = mode;
    }

    /// Number of calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Overwrite `key` unconditionally, bypassing the lock protocol.
    pub fn force_set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Current value of `key` without counting a call or applying failures.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Count the call, apply the configured delay, then fail if the failure
    /// mode says so.
    async fn begin(&self) -> Result<(), LockError> {
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fail = match &*self.failure_mode.lock() {
            FailureMode::None => false,
            FailureMode::EveryN(n) => call_number.is_multiple_of(*n),
            FailureMode::FirstN(n) => call_number <= *n,
            FailureMode::Always => true,
        };
        if fail {
            return Err(LockError::Connection(format!(
                "{}: simulated failure on call #{call_number}",
                self.name
            )));
        }
        Ok(())
    }

    fn evict_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }
}

#[async_trait]
impl LockBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        self.begin().await?;

        let entry = Entry {
            value: value.to_owned(),
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(entry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<u64, LockError> {
        self.begin().await?;
        self.evict_expired(key);

        let removed = self
            .entries
            .remove_if(key, |_, entry| entry.value == expected && !entry.is_expired());
        Ok(u64::from(removed.is_some()))
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<u64, LockError> {
        self.begin().await?;
        self.evict_expired(key);

        match self.entries.get_mut(key) {
            Some(mut entry) if entry.value == expected && !entry.is_expired() => {
                entry.expires_at = Instant::now() + ttl;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        self.begin().await?;
        Ok(self.peek(key))
    }

    async fn ping(&self) -> Result<(), LockError> {
        self.begin().await
    }
}

#[cfg(test)]
mod tests {
    use kvlock::testing::run_backend_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let backend = MemoryBackend::new("conformance");
        run_backend_conformance_tests(&backend)
            .await
            .expect("backend conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn key_expires_after_ttl() {
        let backend = MemoryBackend::default();

        assert!(
            backend
                .set_if_absent("expire", "a", Duration::from_secs(2))
                .await
                .unwrap()
        );
        assert_eq!(backend.peek("expire").as_deref(), Some("a"));

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(backend.peek("expire").is_none());
        assert!(
            backend
                .set_if_absent("expire", "b", Duration::from_secs(2))
                .await
                .unwrap(),
            "should claim after TTL expiry"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_cannot_be_extended() {
        let backend = MemoryBackend::default();
        backend.force_set("k", "a", Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let updated = backend
            .compare_and_expire("k", "a", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn always_failing_backend_reports_connection_error() {
        let backend = MemoryBackend::new("down").with_failure_mode(FailureMode::Always);
        let result = backend.set_if_absent("k", "v", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::Connection(_))));
        assert!(backend.peek("k").is_none());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn first_n_failures_then_recover() {
        let backend = MemoryBackend::default().with_failure_mode(FailureMode::FirstN(2));
        assert!(backend.ping().await.is_err());
        assert!(backend.ping().await.is_err());
        assert!(backend.ping().await.is_ok());
    }

    #[tokio::test]
    async fn every_n_fails_periodically() {
        let backend = MemoryBackend::default().with_failure_mode(FailureMode::EveryN(3));
        let results: Vec<bool> = ping_outcomes(&backend, 6).await;
        assert_eq!(results, vec![true, true, false, true, true, false]);
    }

    #[tokio::test]
    async fn clones_share_state_and_failure_mode() {
        let backend = MemoryBackend::default();
        let clone = backend.clone();
        clone.force_set("shared", "v", Duration::from_secs(5));
        assert_eq!(backend.peek("shared").as_deref(), Some("v"));

        clone.set_failure_mode(FailureMode::Always);
        assert!(backend.ping().await.is_err());
    }

    async fn ping_outcomes(backend: &MemoryBackend, n: usize) -> Vec<bool> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(backend.ping().await.is_ok());
        }
        out
    }
}
