/// Unified error type for store connection plumbing
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Redis-specific errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Health check failed
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for store operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;
