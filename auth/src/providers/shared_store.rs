//! Shared key-value store trait.
//!
//! Every piece of cross-request state (challenges, credentials, revocation
//! entries, rate-limit windows) lives behind this trait. Each operation is
//! atomic on a single key; no multi-key transactions are assumed.
//!
//! # Implementation
//!
//! **Production**: [`RedisSharedStore`](crate::stores::RedisSharedStore)
//! **Testing**: [`MockSharedStore`](crate::mocks::MockSharedStore)
//!
//! # Example
//!
//! ```ignore
//! // Single-use read
//! store.set("challenge:abc", bytes, Some(Duration::from_secs(150))).await?;
//! let first = store.get_del("challenge:abc").await?;  // Some(bytes)
//! let second = store.get_del("challenge:abc").await?; // None
//! ```

use crate::error::Result;
use std::time::Duration;

/// Key-value store with per-key TTL and single-key atomic operations.
///
/// # Redis Mapping
///
/// | Operation          | Command                         |
/// |--------------------|---------------------------------|
/// | `set`              | `SET key value [PX ttl]`        |
/// | `set_if_absent`    | `SET key value NX [PX ttl]`     |
/// | `get`              | `GET key`                       |
/// | `get_del`          | `GETDEL key`                    |
/// | `delete`           | `DEL key`                       |
/// | `incr`             | `INCR key`                      |
/// | `expire`           | `PEXPIRE key ttl`               |
/// | `ttl`              | `PTTL key`                      |
/// | `compare_and_swap` | Lua script (TTL-preserving)     |
///
/// # Errors
///
/// Implementations report unreachable backends as `StoreUnavailable` and
/// commands exceeding their deadline as `StoreTimeout`. A missing key is
/// never an error.
pub trait SharedStore: Send + Sync {
    /// Store `value` under `key`, replacing any existing value.
    ///
    /// `ttl = None` stores the value without expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Store `value` only if `key` does not exist.
    ///
    /// # Returns
    ///
    /// `true` if the value was written, `false` if the key already existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn get(&self, key: &str)
    -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Read and delete the value under `key` in one atomic step.
    ///
    /// Among concurrent callers for the same key exactly one observes the value.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn get_del(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Delete `key`.
    ///
    /// # Returns
    ///
    /// `true` if a value existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Atomically increment the integer under `key`, creating it at 0 first.
    ///
    /// # Returns
    ///
    /// The value after the increment.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached or the value is not an integer.
    fn incr(&self, key: &str) -> impl std::future::Future<Output = Result<i64>> + Send;

    /// Set the expiry of an existing key.
    ///
    /// # Returns
    ///
    /// `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Remaining time-to-live of `key`.
    ///
    /// # Returns
    ///
    /// - `Some(remaining)` if the key exists and has an expiry
    /// - `None` if the key is missing or has no expiry
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn ttl(&self, key: &str)
    -> impl std::future::Future<Output = Result<Option<Duration>>> + Send;

    /// Replace the value under `key` with `new` only if it currently equals
    /// `expected`. The key's remaining TTL is preserved.
    ///
    /// # Returns
    ///
    /// `true` if the swap happened, `false` if the key is missing or holds a
    /// different value.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Vec<u8>,
        new: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
