use std::fmt;

use rand::Rng;

/// Opaque value proving ownership of a lock key.
///
/// Rendered as `prefix:timestamp_nanos:random`, where `random` is a
/// non-negative 63-bit integer from the thread-local CSPRNG.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh token with the given prefix.
    pub fn generate(prefix: &str) -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let random: i64 = rand::thread_rng().gen_range(0..=i64::MAX);
        Self(format!("{prefix}:{nanos}:{random}"))
    }

    /// Wrap an existing token value, e.g. one recovered after a restart.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
