//! Error types for the cache subsystem.
//!
//! Variants are grouped by the error categories the cache distinguishes:
//! misuse, tier corruption, cancellation, and resource exhaustion are
//! surfaced to callers. Transient per-entry failures (one disk read
//! failing while the index says others succeed) are handled internally
//! and never escape as an `Error`.

use thiserror::Error;

/// Unified error type for the cache subsystem
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Misuse Errors
    // =========================================================================
    #[error("cache '{0}' has been disposed")]
    Disposed(String),

    #[error("key must not be null or empty")]
    NullKey,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("a cache named '{0}' already exists")]
    DuplicateCacheName(String),

    #[error("no cache named '{0}' is registered")]
    CacheNotFound(String),

    // =========================================================================
    // Tier Corruption Errors
    // =========================================================================
    #[error("corrupted disk entry at '{path}': {reason}")]
    CorruptedEntry { path: String, reason: String },

    #[error("codec error: {0}")]
    Codec(String),

    // =========================================================================
    // Cancellation
    // =========================================================================
    #[error("operation cancelled")]
    Cancelled,

    // =========================================================================
    // Resource Exhaustion Errors
    // =========================================================================
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk tier concurrency limit exhausted")]
    ConcurrencyExhausted,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same operation might succeed without the
    /// caller changing anything, as opposed to a misuse error that will
    /// fail again until the caller does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConcurrencyExhausted | Error::BackendUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposed_is_not_retryable() {
        assert!(!Error::Disposed("l1".into()).is_retryable());
    }

    #[test]
    fn io_is_retryable() {
        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.is_retryable());
    }
}
