//! Mock shared store for testing.

use crate::environment::{SharedClock, system_clock};
use crate::error::{AuthError, Result};
use crate::providers::SharedStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injected into every subsequent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFailure {
    /// Commands succeed.
    #[default]
    None,

    /// Commands fail with `StoreUnavailable`.
    Unavailable,

    /// Commands fail with `StoreTimeout`.
    Timeout,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    failure: StoreFailure,
}

/// Mock shared store.
///
/// In-memory implementation with Redis semantics. Expiry is evaluated against
/// the injected clock, so TTL behaviour can be tested without sleeping.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Clone)]
pub struct MockSharedStore {
    inner: Arc<Mutex<Inner>>,
    clock: SharedClock,
}

impl MockSharedStore {
    /// Create a mock store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a mock store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Inject a failure into every subsequent command.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_failure(&self, failure: StoreFailure) {
        self.inner.lock().unwrap().failure = failure;
    }

    /// Number of live keys.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.inner
            .lock()
            .unwrap()
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is live.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Run `f` against the live entries, after dropping expired ones.
    ///
    /// Yields first so concurrent callers interleave the way they would
    /// against a network store.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn with_entries<T>(
        &self,
        command: &str,
        f: impl FnOnce(&mut HashMap<String, Entry>, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        tokio::task::yield_now().await;

        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();
        match inner.failure {
            StoreFailure::None => {}
            StoreFailure::Unavailable => {
                return Err(AuthError::StoreUnavailable(format!(
                    "{command} failed: connection refused"
                )));
            }
            StoreFailure::Timeout => return Err(AuthError::StoreTimeout(command.to_string())),
        }

        inner.entries.retain(|_, entry| entry.is_live(now));
        f(&mut inner.entries, now)
    }

    fn deadline(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|ttl| now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()))
    }
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

impl Default for MockSharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MockSharedStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.with_entries("SET", |entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Self::deadline(now, ttl),
                },
            );
            Ok(())
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.with_entries("SET NX", |entries, now| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Self::deadline(now, ttl),
                },
            );
            Ok(true)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_entries("GET", |entries, _| {
            Ok(entries.get(key).map(|entry| entry.value.clone()))
        })
        .await
    }

    async fn get_del(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_entries("GETDEL", |entries, _| {
            Ok(entries.remove(key).map(|entry| entry.value))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_entries("DEL", |entries, _| Ok(entries.remove(key).is_some()))
            .await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.with_entries("INCR", |entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: b"0".to_vec(),
                expires_at: None,
            });

            let current: i64 = std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    AuthError::StoreUnavailable("INCR failed: value is not an integer".into())
                })?;

            let next = current + 1;
            entry.value = next.to_string().into_bytes();
            Ok(next)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.with_entries("PEXPIRE", |entries, now| {
            Ok(entries.get_mut(key).is_some_and(|entry| {
                entry.expires_at = Self::deadline(now, Some(ttl));
                true
            }))
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.with_entries("PTTL", |entries, now| {
            Ok(entries
                .get(key)
                .and_then(|entry| entry.expires_at)
                .and_then(|at| (at - now).to_std().ok()))
        })
        .await
    }

    async fn compare_and_swap(&self, key: &str, expected: Vec<u8>, new: Vec<u8>) -> Result<bool> {
        self.with_entries("CAS", |entries, _| match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.value = new;
                Ok(true)
            }
            _ => Ok(false),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::MockClock;

    fn store() -> (MockSharedStore, MockClock) {
        let clock = MockClock::default();
        (MockSharedStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_ttl_expiry_follows_clock() {
        let (store, clock) = store();
        store
            .set("k", b"v".to_vec(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(1)));
        assert!(store.contains_key("k"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incr_creates_counter_without_expiry() {
        let (store, _) = store();
        assert_eq!(store.incr("n").await.unwrap(), 1);
        assert_eq!(store.incr("n").await.unwrap(), 2);
        assert_eq!(store.ttl("n").await.unwrap(), None);
        assert!(store.expire("n", Duration::from_secs(5)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_swap_keeps_ttl() {
        let (store, _) = store();
        store
            .set("k", b"1".to_vec(), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        assert!(!store.compare_and_swap("k", b"0".to_vec(), b"2".to_vec()).await.unwrap());
        assert!(store.compare_and_swap("k", b"1".to_vec(), b"2".to_vec()).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(30)));
        assert!(!store.compare_and_swap("gone", b"1".to_vec(), b"2".to_vec()).await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (store, _) = store();

        store.set_failure(StoreFailure::Unavailable);
        assert!(matches!(store.get("k").await, Err(AuthError::StoreUnavailable(_))));

        store.set_failure(StoreFailure::Timeout);
        assert!(matches!(store.get_del("k").await, Err(AuthError::StoreTimeout(_))));

        store.set_failure(StoreFailure::None);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
