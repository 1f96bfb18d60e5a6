//! Redis-based shared store implementation.
//!
//! # Architecture
//!
//! One `ConnectionManager` (multiplexed, auto-reconnecting) is shared by every
//! component. Each command is bounded by `command_timeout`:
//!
//! - elapsed deadline → `AuthError::StoreTimeout`
//! - connection or command failure → `AuthError::StoreUnavailable`
//!
//! Compare-and-swap runs as a Lua script so the read, compare and write happen
//! atomically on the server, and `KEEPTTL` leaves the key's expiry untouched.
//! Requires Redis 6.2+ (`GETDEL`).
//!
//! # Example
//!
//! ```no_run
//! use passkey_auth::stores::{RedisSharedStore, RedisStoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisSharedStore::connect(RedisStoreConfig::new("redis://127.0.0.1:6379")).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::providers::SharedStore;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult, Script};
use std::future::Future;
use std::time::Duration;

const COMPARE_AND_SWAP: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
    return 1
end
return 0
";

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379").
    pub url: String,

    /// Upper bound on a single command.
    ///
    /// Default: 2 seconds
    pub command_timeout: Duration,
}

impl RedisStoreConfig {
    /// Create config with the default command timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout: Duration::from_secs(2),
        }
    }

    /// Set per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// `Redis`-backed [`SharedStore`].
#[derive(Clone)]
pub struct RedisSharedStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,

    /// Per-command deadline.
    command_timeout: Duration,

    /// TTL-preserving compare-and-swap.
    cas_script: Script,
}

impl RedisSharedStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the URL is invalid or the connection fails,
    /// `StoreTimeout` if the connection is not established within the command timeout.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            AuthError::StoreUnavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager =
            match tokio::time::timeout(config.command_timeout, ConnectionManager::new(client))
                .await
            {
                Ok(Ok(manager)) => manager,
                Ok(Err(e)) => {
                    return Err(AuthError::StoreUnavailable(format!(
                        "Failed to create Redis connection manager: {e}"
                    )));
                }
                Err(_) => return Err(AuthError::StoreTimeout("CONNECT".into())),
            };

        tracing::info!(
            command_timeout_ms = config.command_timeout.as_millis(),
            "Connected to Redis shared store"
        );

        Ok(Self {
            conn_manager,
            command_timeout: config.command_timeout,
            cas_script: Script::new(COMPARE_AND_SWAP),
        })
    }

    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// See [`RedisSharedStore::connect`].
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::connect(RedisStoreConfig::new(redis_url)).await
    }

    /// Round-trip a `PING`.
    ///
    /// # Errors
    ///
    /// Returns error if `Redis` is unreachable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let cmd = redis::cmd("PING");
        let _: String = self.run("PING", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    /// Apply the command deadline and map backend errors.
    async fn run<T>(
        &self,
        command: &'static str,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(command, error = %e, "Redis command failed");
                Err(AuthError::StoreUnavailable(format!("{command} failed: {e}")))
            }
            Err(_) => {
                tracing::warn!(
                    command,
                    timeout_ms = self.command_timeout.as_millis(),
                    "Redis command timed out"
                );
                Err(AuthError::StoreTimeout(command.to_string()))
            }
        }
    }
}

/// Milliseconds for `PX`/`PEXPIRE`, at least 1 (Redis rejects 0).
#[allow(clippy::cast_possible_truncation)] // TTLs are far below u64::MAX ms
fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl SharedStore for RedisSharedStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        match ttl {
            Some(ttl) => {
                let _: () = self
                    .run("SET PX", conn.pset_ex(key, value, millis(ttl)))
                    .await?;
            }
            None => {
                let _: () = self.run("SET", conn.set(key, value)).await?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }

        // Nil reply means the key already existed
        let reply: Option<String> = self.run("SET NX", cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        self.run("GET", conn.get(key)).await
    }

    async fn get_del(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        // GETDEL is atomic: get + delete in one operation
        self.run("GETDEL", conn.get_del(key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let removed: i64 = self.run("DEL", conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        self.run("INCR", conn.incr(key, 1_i64)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        #[allow(clippy::cast_possible_wrap)] // TTLs are far below i64::MAX ms
        let ms = millis(ttl) as i64;
        self.run("PEXPIRE", conn.pexpire(key, ms)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn_manager.clone();
        // -2: missing key, -1: no expiry
        let remaining_ms: i64 = self.run("PTTL", conn.pttl(key)).await?;
        Ok(u64::try_from(remaining_ms).ok().map(Duration::from_millis))
    }

    async fn compare_and_swap(&self, key: &str, expected: Vec<u8>, new: Vec<u8>) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let swapped: i64 = self
            .run(
                "CAS",
                self.cas_script
                    .key(key)
                    .arg(expected)
                    .arg(new)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(swapped == 1)
    }
}
