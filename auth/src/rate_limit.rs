//! Fixed-window rate limiting over the shared store.
//!
//! # Algorithm
//!
//! 1. `INCR {scope}:{client}` (atomic, so concurrent requests
//!    never both observe the same count)
//! 2. On the first increment of a window, `PEXPIRE` the key to the window length
//! 3. Compare the post-increment count with the limit
//!
//! Windows count *attempts*: a denied request still increments the counter
//! and nothing is ever decremented.
//!
//! # Degraded Mode
//!
//! If the store fails, the request is allowed (fail-open) and the decision is
//! flagged `degraded`. A store outage must not take the service down with it.

use crate::config::RateLimitPolicy;
use crate::constants::metrics as metric_names;
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::providers::SharedStore;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Configured limit for the window.
    pub limit: u32,

    /// Requests left in the current window.
    pub remaining: u32,

    /// When the current window ends.
    pub reset_at: DateTime<Utc>,

    /// Time until the current window ends.
    pub reset_after: Duration,

    /// The store failed and the request was allowed without counting.
    pub degraded: bool,
}

impl RateDecision {
    /// Convert a denial into `RateLimited`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` if the request is not allowed.
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AuthError::RateLimited {
                retry_after: self.reset_after,
            })
        }
    }
}

/// Rate limiter over a [`SharedStore`].
#[derive(Clone)]
pub struct RateLimiter<S> {
    store: S,
    clock: SharedClock,
}

impl<S: SharedStore> RateLimiter<S> {
    /// Create a rate limiter.
    #[must_use]
    pub fn new(store: S, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn key(scope: &str, client: &str) -> String {
        format!("{scope}:{client}")
    }

    /// Count one attempt by `client` against `scope` and decide.
    ///
    /// Never fails: store errors produce an allowed, `degraded` decision.
    pub async fn check(
        &self,
        scope: &str,
        client: &str,
        window: Duration,
        limit: u32,
    ) -> RateDecision {
        let key = Self::key(scope, client);
        let now = self.clock.now();

        match self.count(&key, window).await {
            Ok((count, reset_after)) => {
                let remaining = u32::try_from((i64::from(limit) - count).max(0)).unwrap_or(0);
                let allowed = count <= i64::from(limit);

                if !allowed {
                    tracing::info!(scope, client, count, limit, "Rate limit exceeded");
                    metrics::counter!(metric_names::RATE_LIMIT_REJECTED, "scope" => scope.to_string())
                        .increment(1);
                }

                RateDecision {
                    allowed,
                    limit,
                    remaining,
                    reset_at: now + to_chrono(reset_after),
                    reset_after,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    scope,
                    client,
                    error = %e,
                    "Rate limiter store failure, allowing request (degraded mode)"
                );
                metrics::counter!(metric_names::RATE_LIMIT_DEGRADED, "scope" => scope.to_string())
                    .increment(1);

                RateDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_at: now + to_chrono(window),
                    reset_after: window,
                    degraded: true,
                }
            }
        }
    }

    /// Check against a policy preset.
    pub async fn check_policy(&self, policy: &RateLimitPolicy, client: &str) -> RateDecision {
        self.check(&policy.scope, client, policy.window, policy.limit)
            .await
    }

    /// Increment and return `(count, time until window reset)`.
    async fn count(&self, key: &str, window: Duration) -> Result<(i64, Duration)> {
        let count = self.store.incr(key).await?;

        if count == 1 {
            self.store.expire(key, window).await?;
            return Ok((count, window));
        }

        match self.store.ttl(key).await? {
            Some(remaining) => Ok((count, remaining)),
            None => {
                // Expiry was lost (e.g. a failed PEXPIRE after the first INCR);
                // re-arm so the window cannot last forever.
                tracing::debug!(key, "Re-arming rate-limit window without expiry");
                self.store.expire(key, window).await?;
                Ok((count, window))
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::{MockClock, MockSharedStore, StoreFailure};
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(900);

    fn limiter() -> (RateLimiter<MockSharedStore>, MockSharedStore, MockClock) {
        let clock = MockClock::default();
        let store = MockSharedStore::with_clock(Arc::new(clock.clone()));
        (
            RateLimiter::new(store.clone(), Arc::new(clock.clone())),
            store,
            clock,
        )
    }

    #[tokio::test]
    async fn test_sixteenth_attempt_denied() {
        let (limiter, _, _) = limiter();

        for attempt in 1..=15_u32 {
            let decision = limiter.check("auth", "1.2.3.4", WINDOW, 15).await;
            assert!(decision.allowed, "attempt {attempt} should pass");
            assert_eq!(decision.remaining, 15 - attempt);
        }

        let decision = limiter.check("auth", "1.2.3.4", WINDOW, 15).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(!decision.degraded);
        assert!(matches!(
            decision.into_result(),
            Err(AuthError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let (limiter, _, clock) = limiter();

        for _ in 0..3 {
            limiter.check("auth", "client", WINDOW, 2).await;
        }
        assert!(!limiter.check("auth", "client", WINDOW, 2).await.allowed);

        clock.advance(WINDOW);
        let decision = limiter.check("auth", "client", WINDOW, 2).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_after, WINDOW);
    }

    #[tokio::test]
    async fn test_reset_counts_down() {
        let (limiter, _, clock) = limiter();
        let first = limiter.check("auth", "client", WINDOW, 5).await;

        clock.advance(Duration::from_secs(100));
        let second = limiter.check("auth", "client", WINDOW, 5).await;

        assert_eq!(second.reset_after, Duration::from_secs(800));
        assert_eq!(second.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn test_scopes_and_clients_are_isolated() {
        let (limiter, _, _) = limiter();
        assert!(limiter.check("auth", "a", WINDOW, 1).await.allowed);
        assert!(!limiter.check("auth", "a", WINDOW, 1).await.allowed);
        assert!(limiter.check("auth", "b", WINDOW, 1).await.allowed);
        assert!(limiter.check("global", "a", WINDOW, 1).await.allowed);
    }

    #[tokio::test]
    async fn test_lost_expiry_is_rearmed() {
        let (limiter, store, _) = limiter();
        store.incr("auth:client").await.unwrap();

        let decision = limiter.check("auth", "client", WINDOW, 5).await;
        assert_eq!(decision.reset_after, WINDOW);
        assert_eq!(store.ttl("auth:client").await.unwrap(), Some(WINDOW));
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let (limiter, store, _) = limiter();
        store.set_failure(StoreFailure::Unavailable);

        let decision = limiter.check("auth", "client", WINDOW, 15).await;
        assert!(decision.allowed);
        assert!(decision.degraded);
        assert_eq!(decision.remaining, 15);
    }

    #[tokio::test]
    async fn test_policy_presets() {
        let (limiter, store, _) = limiter();
        let decision = limiter
            .check_policy(&RateLimitPolicy::auth(), "1.2.3.4")
            .await;
        assert_eq!(decision.limit, 15);
        assert!(store.contains_key("auth-rate-limit:1.2.3.4"));
    }
}
