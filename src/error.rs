//! Error types for the feed cache subsystem

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the cache subsystem.
///
/// Only backends, constructors and the binary surface these. The
/// [`CacheProvider`](crate::domain::ports::CacheProvider) boundary converts
/// every one of them into a safe default.
#[derive(Error, Debug)]
pub enum Error {
    /// Redis command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis connection pool error
    #[error("Redis pool error: {0}")]
    Pool(String),

    /// Generic backend failure (non-Redis stores, injected faults)
    #[error("Backend error on {backend}: {reason}")]
    Backend { backend: String, reason: String },

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sharded provider constructed without any backend
    #[error("Sharded cache requires at least one backend")]
    NoShards,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalidation queue is closed
    #[error("Invalidation channel closed: {0}")]
    Channel(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short, stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Redis(_) => "redis",
            Error::Pool(_) => "pool",
            Error::Backend { .. } => "backend",
            Error::Serialization(_) => "serialization",
            Error::NoShards => "no_shards",
            Error::Config(_) => "config",
            Error::Channel(_) => "channel",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Build a backend failure.
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Error::Pool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(Error::NoShards.kind(), "no_shards");
        assert_eq!(Error::backend("mem-0", "down").kind(), "backend");
        assert_eq!(Error::Config("bad".into()).kind(), "config");
    }

    #[test]
    fn test_error_display() {
        let err = Error::backend("mem-1", "injected failure");
        assert_eq!(err.to_string(), "Backend error on mem-1: injected failure");
        assert_eq!(
            Error::NoShards.to_string(),
            "Sharded cache requires at least one backend"
        );
    }
}
