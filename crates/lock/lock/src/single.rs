use async_trait::async_trait;
use tracing::debug;

use crate::backend::SharedBackend;
use crate::config::LockConfig;
use crate::context::LockContext;
use crate::error::LockError;
use crate::lock::DistributedLock;
use crate::token::LockToken;

/// A lock on exactly one backend.
///
/// Claiming is a single set-if-absent with expiry; release and refresh are
/// server-side compare-and-act operations, so a lock that expired and was
/// taken by another owner can never be deleted or extended by this
/// instance.
#[derive(Clone)]
pub struct SingleLock {
    backend: SharedBackend,
    key: String,
    token: LockToken,
    config: LockConfig,
}

impl SingleLock {
    /// Bind `key` on `backend` with a freshly generated token.
    pub fn new(backend: SharedBackend, key: impl Into<String>, config: LockConfig) -> Self {
        let token = LockToken::generate(&config.value_prefix);
        Self::with_token(backend, key, token, config)
    }

    /// Bind `key` on `backend` with a caller-supplied token.
    pub fn with_token(
        backend: SharedBackend,
        key: impl Into<String>,
        token: LockToken,
        config: LockConfig,
    ) -> Self {
        Self {
            backend,
            key: key.into(),
            token,
            config,
        }
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Name of the backend this lock is bound to.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl std::fmt::Debug for SingleLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleLock")
            .field("backend", &self.backend.name())
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DistributedLock for SingleLock {
    async fn acquire(&self, ctx: &LockContext) -> Result<bool, LockError> {
        self.config.validate()?;
        let acquired = ctx
            .run(
                self.backend
                    .set_if_absent(&self.key, self.token.as_str(), self.config.expiration),
            )
            .await?;

        debug!(
            key = %self.key,
            backend = %self.backend.name(),
            acquired,
            "lock acquire attempt"
        );
        Ok(acquired)
    }

    async fn release(&self, ctx: &LockContext) -> Result<(), LockError> {
        let deleted = ctx
            .run(
                self.backend
                    .compare_and_delete(&self.key, self.token.as_str()),
            )
            .await?;

        if deleted == 0 {
            return Err(LockError::NotHeld {
                key: self.key.clone(),
            });
        }
        debug!(key = %self.key, backend = %self.backend.name(), "lock released");
        Ok(())
    }

    async fn refresh(&self, ctx: &LockContext) -> Result<(), LockError> {
        self.config.validate()?;
        let updated = ctx
            .run(self.backend.compare_and_expire(
                &self.key,
                self.token.as_str(),
                self.config.expiration,
            ))
            .await?;

        if updated == 0 {
            return Err(LockError::NotHeld {
                key: self.key.clone(),
            });
        }
        Ok(())
    }

    async fn is_held(&self, ctx: &LockContext) -> Result<bool, LockError> {
        let current = ctx.run(self.backend.get(&self.key)).await?;
        Ok(current.as_deref() == Some(self.token.as_str()))
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn value(&self) -> &str {
        self.token.as_str()
    }

    fn config(&self) -> &LockConfig {
        &self.config
    }
}
