//! Storage implementations for the auth system.
//!
//! - **Shared Store** (Redis) - Challenges, credentials, revocation entries and
//!   rate-limit windows, all under one connection manager

pub mod redis;

// Re-exports
pub use redis::{RedisSharedStore, RedisStoreConfig};
