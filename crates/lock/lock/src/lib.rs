//! Mutual-exclusion locks coordinated through key-value stores.
//!
//! Two lock kinds share the [`DistributedLock`] capability set:
//!
//! - [`SingleLock`] claims a key on one [`LockBackend`] with an atomic
//!   set-if-absent and releases it with an atomic compare-and-delete.
//! - [`QuorumLock`] claims the same key on several independent backends and
//!   holds it only while a strict majority agrees.
//!
//! Ownership is proven by the stored value: a lock is held by an instance
//! exactly when the backend stores that instance's [`LockToken`].
//!
//! # Example
//!
//! ```ignore
//! use kvlock::{DistributedLock, LockConfig, LockContext, LockManager};
//!
//! let manager = LockManager::new(backends)?;
//! let lock = manager.new_quorum_lock("job:42", LockConfig::default());
//! let ctx = LockContext::new();
//!
//! if lock.acquire_with_retry(&ctx, 0, Duration::ZERO).await? {
//!     // critical section
//!     lock.release(&ctx).await?;
//! }
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod manager;
pub mod quorum;
pub mod single;
pub mod testing;
pub mod token;

pub use backend::{LockBackend, SharedBackend};
pub use config::{LockConfig, LockOverrides, MIN_EXPIRATION};
pub use context::LockContext;
pub use error::{BackendFailure, LockError, QuorumFailure, QuorumOp};
pub use lock::{DistributedLock, TIMEOUT_POLL_INTERVAL};
pub use manager::{BackendHealth, LockManager, LockMode};
pub use quorum::QuorumLock;
pub use single::SingleLock;
pub use token::LockToken;
