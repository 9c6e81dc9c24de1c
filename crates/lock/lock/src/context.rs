use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LockError;

/// Cancellation signal and optional deadline carried through every lock call.
///
/// Contexts form a tree: [`with_timeout`](Self::with_timeout) derives a
/// child whose cancellation follows the parent, while cancelling the child
/// leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl LockContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token, e.g. a service shutdown token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derive a child bounded by `timeout` from now, never later than the
    /// parent's own deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child bounded by `deadline`, never later than the parent's.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<(), LockError> {
        if self.cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LockError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` until it finishes, the context is cancelled, or the
    /// deadline passes, whichever comes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, LockError>
    where
        F: Future<Output = Result<T, LockError>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LockError::Cancelled),
            () = deadline => Err(LockError::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// Sleep for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), LockError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn run_passes_result_through() {
        let ctx = LockContext::new();
        let value = ctx.run(async { Ok::<_, LockError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_slow_future() {
        let ctx = LockContext::new().with_timeout(Duration::from_millis(50));
        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(LockError::DeadlineExceeded)));
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let ctx = LockContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn already_cancelled_fails_before_polling() {
        let ctx = LockContext::new();
        ctx.cancel();
        let polled = AtomicBool::new(false);
        let result = ctx
            .run(async {
                polled.store(true, Ordering::SeqCst);
                Ok::<_, LockError>(())
            })
            .await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_never_exceeds_parent() {
        let parent = LockContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.remaining(), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent() {
        let parent = LockContext::new();
        let child = parent.with_timeout(Duration::from_secs(5));
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.with_timeout(Duration::from_secs(5));
        parent.cancel();
        assert!(other.is_cancelled());
    }
}
