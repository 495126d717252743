use crate::common::DatabaseError;

/// Redis connection configuration
///
/// Holds the connection settings for the shared Redis store. It can be
/// constructed manually or loaded from environment variables.
///
/// # Example
///
/// ```ignore
/// use database::redis::RedisConfig;
///
/// // Manual construction
/// let config = RedisConfig::new("redis://127.0.0.1:6379");
///
/// // From environment variables
/// let config = RedisConfig::from_env()?;
///
/// // Use with connect()
/// let conn = database::redis::connect(&config.url).await?;
/// ```
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis connection URL (required)
    pub url: String,

    /// Optional database number (0-15 for default Redis)
    pub database: Option<u8>,
}

impl RedisConfig {
    /// Create a new RedisConfig with just a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: None,
        }
    }

    /// Create a RedisConfig with a specific database number
    pub fn with_database(url: impl Into<String>, database: u8) -> Self {
        Self {
            url: url.into(),
            database: Some(database),
        }
    }

    /// Get a reference to the Redis URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Load a RedisConfig from environment variables
    ///
    /// Environment variables:
    /// - `REDIS_URL` or `REDIS_HOST` (required) - Redis connection string
    /// - `REDIS_DATABASE` (optional) - Redis database number (0-15)
    pub fn from_env() -> Result<Self, DatabaseError> {
        // Try REDIS_URL first, fall back to REDIS_HOST (for compatibility)
        let url = std::env::var("REDIS_URL")
            .or_else(|_| std::env::var("REDIS_HOST"))
            .map_err(|_| {
                DatabaseError::ConfigError("REDIS_URL or REDIS_HOST not set".to_string())
            })?;

        let database = if let Ok(db_str) = std::env::var("REDIS_DATABASE") {
            Some(db_str.parse().map_err(|e| {
                DatabaseError::ConfigError(format!("invalid REDIS_DATABASE: {}", e))
            })?)
        } else {
            None
        };

        Ok(Self { url, database })
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            database: None,
        }
    }
}
