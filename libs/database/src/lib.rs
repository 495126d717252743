//! Database library providing connection plumbing for the shared key-value store
//!
//! This library provides a unified interface for connecting to and managing
//! store connections. Only Redis is wired up today; the module layout leaves
//! room for additional backends behind their own features.
//!
//! # Features
//!
//! - `redis` (default) - Redis support
//!
//! # Examples
//!
//! ## Redis
//!
//! ```ignore
//! use database::redis;
//! use redis::AsyncCommands;
//!
//! let mut conn = redis::connect("redis://127.0.0.1:6379").await?;
//! conn.set::<_, _, ()>("key", "value").await?;
//! ```

// Always available modules
pub mod common;

// Store-specific modules (conditional based on features)
#[cfg(feature = "redis")]
pub mod redis;

// Re-exports for convenience
pub use common::{DatabaseError, DatabaseResult};
