mod backend;

pub use backend::{FailureMode, MemoryBackend};
