use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::backend::SharedBackend;
use crate::config::LockConfig;
use crate::context::LockContext;
use crate::error::LockError;
use crate::lock::DistributedLock;
use crate::quorum::QuorumLock;
use crate::single::SingleLock;

/// Which kind of lock [`LockManager::new_dyn`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// One lock on the first backend.
    #[default]
    Single,
    /// A majority lock across every backend.
    Quorum,
}

/// Outcome of pinging one backend.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    pub backend: String,
    pub result: Result<(), LockError>,
}

impl BackendHealth {
    pub fn is_healthy(&self) -> bool {
        self.result.is_ok()
    }
}

/// Factory binding a fixed set of backends to new lock instances.
///
/// Single locks use the first backend; quorum locks use all of them.
#[derive(Clone)]
pub struct LockManager {
    backends: Vec<SharedBackend>,
    defaults: LockConfig,
}

impl LockManager {
    /// Create a manager over `backends`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidConfig`] if `backends` is empty.
    pub fn new(backends: Vec<SharedBackend>) -> Result<Self, LockError> {
        if backends.is_empty() {
            return Err(LockError::InvalidConfig(
                "a lock manager needs at least one backend".into(),
            ));
        }
        Ok(Self {
            backends,
            defaults: LockConfig::default(),
        })
    }

    /// Replace the configuration used by [`lock`](Self::lock) and
    /// [`quorum_lock`](Self::quorum_lock).
    #[must_use]
    pub fn with_defaults(mut self, defaults: LockConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &LockConfig {
        &self.defaults
    }

    pub fn backends(&self) -> &[SharedBackend] {
        &self.backends
    }

    pub fn backend(&self, index: usize) -> Option<&SharedBackend> {
        self.backends.get(index)
    }

    /// A single lock on the first backend.
    pub fn new_lock(&self, key: impl Into<String>, config: LockConfig) -> SingleLock {
        SingleLock::new(Arc::clone(&self.backends[0]), key, config)
    }

    /// A quorum lock across every backend.
    pub fn new_quorum_lock(&self, key: impl Into<String>, config: LockConfig) -> QuorumLock {
        QuorumLock::new(&self.backends, key, config)
    }

    /// [`new_lock`](Self::new_lock) with the manager's defaults.
    pub fn lock(&self, key: impl Into<String>) -> SingleLock {
        self.new_lock(key, self.defaults.clone())
    }

    /// [`new_quorum_lock`](Self::new_quorum_lock) with the manager's defaults.
    pub fn quorum_lock(&self, key: impl Into<String>) -> QuorumLock {
        self.new_quorum_lock(key, self.defaults.clone())
    }

    /// Either kind of lock behind the common trait.
    pub fn new_dyn(
        &self,
        key: impl Into<String>,
        config: LockConfig,
        mode: LockMode,
    ) -> Box<dyn DistributedLock> {
        match mode {
            LockMode::Single => Box::new(self.new_lock(key, config)),
            LockMode::Quorum => Box::new(self.new_quorum_lock(key, config)),
        }
    }

    /// Ping every backend concurrently.
    pub async fn health_check(&self, ctx: &LockContext) -> Vec<BackendHealth> {
        let results = join_all(self.backends.iter().map(|b| ctx.run(b.ping()))).await;

        self.backends
            .iter()
            .zip(results)
            .map(|(backend, result)| {
                match &result {
                    Ok(()) => info!(backend = %backend.name(), "backend health check passed"),
                    Err(e) => warn!(
                        backend = %backend.name(),
                        error = %e,
                        "backend health check failed"
                    ),
                }
                BackendHealth {
                    backend: backend.name().to_owned(),
                    result,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("LockManager")
            .field("backends", &names)
            .field("defaults", &self.defaults)
            .finish()
    }
}
