use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::config::LockConfig;
use crate::context::LockContext;
use crate::error::LockError;

/// Interval between attempts in [`DistributedLock::try_acquire_with_timeout`].
pub const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capability set shared by single-backend and quorum locks.
///
/// One instance represents one logical owner: its token is fixed at
/// construction, so repeated acquire attempts from the same instance are
/// safe to retry. Whether the lock is held is never tracked locally; every
/// answer comes from the backends.
///
/// Contention is not an error: acquire methods return `Ok(false)` when the
/// key belongs to someone else and reserve `Err` for store failures and for
/// cancellation of the [`LockContext`].
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Make one attempt to claim the key.
    async fn acquire(&self, ctx: &LockContext) -> Result<bool, LockError>;

    /// Release the key if this instance still owns it.
    ///
    /// Returns [`LockError::NotHeld`] (or a contention quorum failure) when
    /// the key expired or now belongs to another owner.
    async fn release(&self, ctx: &LockContext) -> Result<(), LockError>;

    /// Reset the key's expiry if this instance still owns it.
    async fn refresh(&self, ctx: &LockContext) -> Result<(), LockError>;

    /// Whether the backends currently store this instance's token.
    async fn is_held(&self, ctx: &LockContext) -> Result<bool, LockError>;

    /// The business key guarded by this lock.
    fn key(&self) -> &str;

    /// The ownership token stored under the key.
    fn value(&self) -> &str;

    fn config(&self) -> &LockConfig;

    /// Same as [`acquire`](Self::acquire).
    async fn try_acquire(&self, ctx: &LockContext) -> Result<bool, LockError> {
        self.acquire(ctx).await
    }

    /// Attempt up to `retry_count` times, waiting about `retry_delay`
    /// between attempts.
    ///
    /// A zero `retry_count` or `retry_delay` falls back to the lock's
    /// configuration. Returns `Ok(false)` once the attempts are exhausted.
    /// A store failure ends the loop at once, as does cancellation of `ctx`
    /// while waiting.
    async fn acquire_with_retry(
        &self,
        ctx: &LockContext,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Result<bool, LockError> {
        let config = self.config();
        let attempts = if retry_count == 0 {
            config.retry_count.max(1)
        } else {
            retry_count
        };
        let delay = if retry_delay.is_zero() {
            config.retry_delay
        } else {
            retry_delay
        };

        for attempt in 1..=attempts {
            if attempt_succeeded(self.acquire(ctx).await)? {
                return Ok(true);
            }
            debug!(key = %self.key(), attempt, attempts, "lock contended");

            if attempt < attempts {
                ctx.sleep(jittered(delay, config.retry_jitter)).await?;
            }
        }
        Ok(false)
    }

    /// Keep attempting every [`TIMEOUT_POLL_INTERVAL`] until the key is
    /// claimed or `timeout` elapses.
    ///
    /// A zero `timeout` falls back to the lock's configured acquire
    /// timeout. Running out of time yields [`LockError::DeadlineExceeded`],
    /// not `Ok(false)`.
    async fn try_acquire_with_timeout(
        &self,
        ctx: &LockContext,
        timeout: Duration,
    ) -> Result<bool, LockError> {
        let timeout = if timeout.is_zero() {
            self.config().acquire_timeout
        } else {
            timeout
        };
        let bounded = ctx.with_timeout(timeout);

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            if attempt_succeeded(self.acquire(&bounded).await)? {
                return Ok(true);
            }
            debug!(key = %self.key(), attempt, "lock contended, polling");
            bounded.sleep(TIMEOUT_POLL_INTERVAL).await?;
        }
    }
}

/// Fold contention into `Ok(false)` and keep every other error.
fn attempt_succeeded(result: Result<bool, LockError>) -> Result<bool, LockError> {
    match result {
        Ok(acquired) => Ok(acquired),
        Err(e) if e.is_contention() => Ok(false),
        Err(e) => Err(e),
    }
}

/// `delay` plus a uniform random extra in `0..=jitter`.
pub(crate) fn jittered(delay: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return delay;
    }
    delay + rand::thread_rng().gen_range(Duration::ZERO..=jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify object safety.
    fn _assert_dyn_lock(_: &dyn DistributedLock) {}

    #[test]
    fn jitter_never_shortens_delay() {
        let delay = Duration::from_millis(10);
        let jitter = Duration::from_millis(5);
        for _ in 0..200 {
            let d = jittered(delay, jitter);
            assert!(d >= delay && d <= delay + jitter, "{d:?} out of range");
        }
    }

    #[test]
    fn zero_jitter_is_fixed() {
        let delay = Duration::from_millis(10);
        assert_eq!(jittered(delay, Duration::ZERO), delay);
    }

    #[test]
    fn contention_folds_to_false() {
        let not_held = Err(LockError::NotHeld { key: "k".into() });
        assert!(!attempt_succeeded(not_held).unwrap());
        assert!(attempt_succeeded(Ok(true)).unwrap());
        assert!(attempt_succeeded(Err(LockError::Backend("down".into()))).is_err());
        assert!(attempt_succeeded(Err(LockError::Cancelled)).is_err());
    }
}
