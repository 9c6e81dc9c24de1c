//! Majority locking over independent backends.
//!
//! A [`QuorumLock`] holds one [`SingleLock`] per backend, all sharing the
//! same key and the same token. An operation succeeds when a strict
//! majority (`n / 2 + 1`) of members agree, so up to `n / 2` backends may
//! be unreachable without losing mutual exclusion: two owners cannot both
//! hold a majority of the same `n` backends.
//!
//! Member calls are issued concurrently and joined before the quorum is
//! evaluated, so one acquire costs the latency of the slowest reachable
//! backend. Each member call is bounded by the caller's [`LockContext`].
//!
//! # Limitations
//!
//! The lock assumes acquisition takes much less time than the expiry and
//! that backend clocks roughly agree. It does not subtract elapsed
//! acquisition time from the validity window; a process pause longer than
//! the expiry lets a second owner in while the first still believes it
//! holds the lock. Use [`DistributedLock::refresh`] for long critical
//! sections and fencing at the protected resource when that matters.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::SharedBackend;
use crate::config::LockConfig;
use crate::context::LockContext;
use crate::error::{BackendFailure, LockError, QuorumFailure, QuorumOp};
use crate::lock::DistributedLock;
use crate::single::SingleLock;
use crate::token::LockToken;

/// A lock held by a strict majority of backends.
#[derive(Debug)]
pub struct QuorumLock {
    key: String,
    token: LockToken,
    members: Vec<SingleLock>,
    config: LockConfig,
}

impl QuorumLock {
    /// Bind `key` on every backend with one freshly generated token.
    pub fn new(backends: &[SharedBackend], key: impl Into<String>, config: LockConfig) -> Self {
        let token = LockToken::generate(&config.value_prefix);
        Self::with_token(backends, key, token, config)
    }

    /// Bind `key` on every backend with a caller-supplied token.
    pub fn with_token(
        backends: &[SharedBackend],
        key: impl Into<String>,
        token: LockToken,
        config: LockConfig,
    ) -> Self {
        let key = key.into();
        let members = backends
            .iter()
            .map(|backend| {
                SingleLock::with_token(
                    Arc::clone(backend),
                    key.clone(),
                    token.clone(),
                    config.clone(),
                )
            })
            .collect();

        Self {
            key,
            token,
            members,
            config,
        }
    }

    /// Number of agreeing members needed for success.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    pub fn members(&self) -> &[SingleLock] {
        &self.members
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    fn failure(&self, op: QuorumOp, successes: usize, errors: Vec<BackendFailure>) -> LockError {
        LockError::Quorum(QuorumFailure {
            op,
            key: self.key.clone(),
            successes,
            quorum: self.quorum(),
            total: self.members.len(),
            errors,
        })
    }

    /// Release every member in a background task, ignoring the outcome.
    ///
    /// The task runs under its own context bounded by `acquire_timeout`, so
    /// a cancelled caller neither waits for it nor leaves partially claimed
    /// keys behind until they expire.
    fn spawn_rollback(&self) -> JoinHandle<()> {
        let members = self.members.clone();
        let key = self.key.clone();
        let budget = self.config.acquire_timeout;

        tokio::spawn(async move {
            let ctx = LockContext::new().with_timeout(budget);
            let results = join_all(members.iter().map(|m| m.release(&ctx))).await;

            for (member, result) in members.iter().zip(results) {
                match result {
                    Ok(()) | Err(LockError::NotHeld { .. }) => {}
                    Err(e) => debug!(
                        key = %key,
                        backend = %member.backend_name(),
                        error = %e,
                        "rollback release failed"
                    ),
                }
            }
        })
    }
}

#[async_trait]
impl DistributedLock for QuorumLock {
    /// Claim the key on every member and keep it only if a majority agreed.
    ///
    /// On failure every member is released in a background task; the
    /// aggregate [`QuorumFailure`] is returned once that finishes, or the
    /// caller's own error as soon as its context ends. A failure caused
    /// only by other owners holding the key classifies as contention.
    async fn acquire(&self, ctx: &LockContext) -> Result<bool, LockError> {
        self.config.validate()?;
        let start = Instant::now();
        let results = join_all(self.members.iter().map(|m| m.acquire(ctx))).await;

        let mut successes = 0;
        let mut errors = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(true) => successes += 1,
                Ok(false) => {}
                Err(error) => errors.push(BackendFailure {
                    backend: member.backend_name().to_owned(),
                    error,
                }),
            }
        }

        let quorum = self.quorum();
        if successes >= quorum {
            let elapsed = start.elapsed();
            if elapsed >= self.config.expiration {
                warn!(
                    key = %self.key,
                    elapsed_ms = elapsed.as_millis(),
                    "quorum reached after the expiry window elapsed"
                );
            }
            info!(key = %self.key, successes, quorum, "quorum lock acquired");
            return Ok(true);
        }

        // The caller's cancellation or deadline wins over the aggregate.
        if let Err(e) = ctx.check() {
            self.spawn_rollback();
            return Err(e);
        }

        if errors.is_empty() {
            debug!(key = %self.key, successes, quorum, "quorum lock contended");
        } else {
            warn!(
                key = %self.key,
                successes,
                quorum,
                failed = errors.len(),
                "quorum lock acquire failed"
            );
        }
        let rollback = self.spawn_rollback();
        ctx.run(async {
            if let Err(e) = rollback.await {
                debug!(key = %self.key, error = %e, "rollback task failed");
            }
            Ok(())
        })
        .await?;
        Err(self.failure(QuorumOp::Acquire, successes, errors))
    }

    /// Release every member; a member that no longer holds the key counts
    /// as released.
    async fn release(&self, ctx: &LockContext) -> Result<(), LockError> {
        let results = join_all(self.members.iter().map(|m| m.release(ctx))).await;

        let mut successes = 0;
        let mut errors = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(()) | Err(LockError::NotHeld { .. }) => successes += 1,
                Err(error) => errors.push(BackendFailure {
                    backend: member.backend_name().to_owned(),
                    error,
                }),
            }
        }

        if successes >= self.quorum() {
            info!(key = %self.key, successes, "quorum lock released");
            return Ok(());
        }
        ctx.check()?;
        warn!(key = %self.key, successes, quorum = self.quorum(), "quorum lock release failed");
        Err(self.failure(QuorumOp::Release, successes, errors))
    }

    /// Extend the expiry on every member that still holds the token.
    async fn refresh(&self, ctx: &LockContext) -> Result<(), LockError> {
        self.config.validate()?;
        let results = join_all(self.members.iter().map(|m| m.refresh(ctx))).await;

        let mut successes = 0;
        let mut errors = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(()) => successes += 1,
                Err(error) => errors.push(BackendFailure {
                    backend: member.backend_name().to_owned(),
                    error,
                }),
            }
        }

        if successes >= self.quorum() {
            return Ok(());
        }
        ctx.check()?;
        Err(self.failure(QuorumOp::Refresh, successes, errors))
    }

    async fn is_held(&self, ctx: &LockContext) -> Result<bool, LockError> {
        let results = join_all(self.members.iter().map(|m| m.is_held(ctx))).await;
        let held = results.into_iter().filter(|r| matches!(r, Ok(true))).count();
        ctx.check()?;
        Ok(held >= self.quorum())
    }

    fn key(&self) -> &str {
        &self.key
    }

    /// The token shared by every member.
    fn value(&self) -> &str {
        self.token.as_str()
    }

    fn config(&self) -> &LockConfig {
        &self.config
    }
}
