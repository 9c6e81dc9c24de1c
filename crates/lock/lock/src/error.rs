use std::fmt;

use thiserror::Error;

/// Errors from lock operations and lock backends.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("lock {key} is not held by this owner")]
    NotHeld { key: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Quorum(#[from] QuorumFailure),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Whether the error means "someone else owns the key" rather than a
    /// fault.
    ///
    /// A quorum failure counts as contention only when every member error
    /// it recorded is contention too.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::NotHeld { .. } => true,
            Self::Quorum(failure) => failure.is_contention(),
            _ => false,
        }
    }

    /// Whether the error came from the caller's context (cancel or deadline).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Whether the error reports an unreachable or failing store.
    pub fn is_backend_failure(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Backend(_) => true,
            Self::Quorum(failure) => !failure.is_contention(),
            _ => false,
        }
    }
}

/// The quorum operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOp {
    Acquire,
    Release,
    Refresh,
}

impl fmt::Display for QuorumOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquire => f.write_str("acquire"),
            Self::Release => f.write_str("release"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// A single member's failure inside a quorum operation.
#[derive(Debug, Clone)]
pub struct BackendFailure {
    /// Name of the backend that failed.
    pub backend: String,
    pub error: LockError,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

/// Aggregate result of a quorum operation that did not reach a majority.
#[derive(Debug, Clone, Error)]
#[error(
    "failed to {op} lock {key} on enough backends: {successes}/{quorum} (of {total}), errors: [{}]",
    render_failures(.errors)
)]
pub struct QuorumFailure {
    pub op: QuorumOp,
    pub key: String,
    pub successes: usize,
    pub quorum: usize,
    pub total: usize,
    pub errors: Vec<BackendFailure>,
}

impl QuorumFailure {
    /// True when no member reported an infrastructure fault.
    pub fn is_contention(&self) -> bool {
        self.errors.iter().all(|f| f.error.is_contention())
    }
}

fn render_failures(errors: &[BackendFailure]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(errors: Vec<BackendFailure>) -> QuorumFailure {
        QuorumFailure {
            op: QuorumOp::Acquire,
            key: "job:42".into(),
            successes: 1,
            quorum: 2,
            total: 3,
            errors,
        }
    }

    #[test]
    fn quorum_without_member_errors_is_contention() {
        let err = LockError::from(failure(Vec::new()));
        assert!(err.is_contention());
        assert!(!err.is_backend_failure());
    }

    #[test]
    fn quorum_with_backend_error_is_a_fault() {
        let err = LockError::from(failure(vec![BackendFailure {
            backend: "redis-2".into(),
            error: LockError::Connection("refused".into()),
        }]));
        assert!(!err.is_contention());
        assert!(err.is_backend_failure());
    }

    #[test]
    fn quorum_message_lists_members() {
        let err = LockError::from(failure(vec![
            BackendFailure {
                backend: "a".into(),
                error: LockError::Backend("boom".into()),
            },
            BackendFailure {
                backend: "b".into(),
                error: LockError::DeadlineExceeded,
            },
        ]));
        assert_eq!(
            err.to_string(),
            "failed to acquire lock job:42 on enough backends: 1/2 (of 3), \
             errors: [a: backend error: boom, b: deadline exceeded]"
        );
    }

    #[test]
    fn cancellation_is_distinct() {
        assert!(LockError::Cancelled.is_cancellation());
        assert!(LockError::DeadlineExceeded.is_cancellation());
        assert!(!LockError::Cancelled.is_contention());
        assert!(!LockError::DeadlineExceeded.is_backend_failure());
        let not_held = LockError::NotHeld { key: "k".into() };
        assert!(not_held.is_contention());
        assert!(!not_held.is_cancellation());
    }
}
