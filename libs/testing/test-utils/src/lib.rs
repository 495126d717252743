//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the domain crates:
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//! use redis::AsyncCommands;
//!
//! #[tokio::test]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let mut conn = redis.connection();
//!
//!     conn.set::<_, _, ()>("key", "value").await.unwrap();
//!     let value: String = conn.get("key").await.unwrap();
//!     assert_eq!(value, "value");
//! }
//! ```

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use self::redis::TestRedis;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by deriving all generated data from a
/// fixed seed.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// This is the recommended way to create a builder for consistent test data.
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a unique account id for testing
    ///
    /// Ids are always positive; zero is reserved for invalid-uid tests.
    pub fn uid(&self) -> u64 {
        (self.seed % 1_000_000) + 1
    }

    /// Generate a unique email address for testing
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("my_test");
    /// let email = builder.email("primary");
    /// // Returns: "test-12345-primary@example.com"
    /// ```
    pub fn email(&self, suffix: &str) -> String {
        format!("test-{}-{}@example.com", self.seed, suffix)
    }

    /// Generate a unique name for testing
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}
