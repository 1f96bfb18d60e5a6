//! Security-focused integration tests.
//!
//! This module verifies the properties that keep the service safe when many
//! instances share one store:
//!
//! - Single-use challenges under concurrent consumption
//! - Monotonic signature counters under concurrent logins
//! - Token revocation and key rotation
//! - Rate limiting per client, failing open on store outage

use futures::future::join_all;
use passkey_auth::{
    AuthError, ChallengePurpose, ChallengeStore, CredentialRegistry, KeyRing, KeyState, Claims,
    RateLimitPolicy, RateLimiter, SharedClock, TokenConfig, TokenIssuer, UserId,
    mocks::{MockClock, MockSharedStore, StoreFailure},
};
use std::sync::Arc;
use std::time::Duration;

fn shared(clock: &MockClock) -> SharedClock {
    Arc::new(clock.clone())
}

/// **Single-use challenges**
///
/// Two instances racing to consume the same challenge must not both succeed,
/// otherwise one signed ceremony response could be replayed for a second token.
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_concurrent_challenge_consumption_single_winner() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let challenges = ChallengeStore::new(store, shared(&clock), Duration::from_secs(150));

    let challenge = challenges
        .issue(ChallengePurpose::Login, None, None)
        .await
        .unwrap();

    let attempts = (0..16).map(|_| {
        let challenges = challenges.clone();
        let value = challenge.value.clone();
        tokio::spawn(async move { challenges.consume(&value).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one consumer may win");
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == AuthError::ChallengeNotFound)
    );
}

/// **Unknown, used and expired challenges look the same**
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_challenge_failures_indistinguishable() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let challenges = ChallengeStore::new(store, shared(&clock), Duration::from_secs(150));

    let used = challenges.issue(ChallengePurpose::Login, None, None).await.unwrap();
    challenges.consume(&used.value).await.unwrap();

    let expired = challenges.issue(ChallengePurpose::Login, None, None).await.unwrap();
    clock.advance(Duration::from_secs(151));

    let unknown = challenges.consume("never-issued").await.unwrap_err();
    let replayed = challenges.consume(&used.value).await.unwrap_err();
    let stale = challenges.consume(&expired.value).await.unwrap_err();

    assert_eq!(unknown, AuthError::ChallengeNotFound);
    assert_eq!(unknown.to_string(), replayed.to_string());
    assert_eq!(unknown.to_string(), stale.to_string());
}

/// **Counters never move backwards**
///
/// Concurrent logins report counters out of order; the stored value must end
/// at the maximum regardless of interleaving.
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_concurrent_counter_updates_keep_maximum() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let registry = CredentialRegistry::new(store, shared(&clock));

    registry
        .store("cred-1", UserId("user-1".into()), None, vec![1, 2, 3])
        .await
        .unwrap();

    let updates = [5_u32, 2, 9, 7, 1, 9, 3, 8].map(|counter| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.update_counter("cred-1", counter).await })
    });

    for result in join_all(updates).await {
        result.unwrap().unwrap();
    }

    assert_eq!(registry.get("cred-1").await.unwrap().counter, 9);
}

/// **Revoked tokens stay revoked on every instance**
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_revocation_visible_to_other_instances() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));

    // Two instances: separate key rings, same store
    let ring = Arc::new(KeyRing::new(TokenConfig::default(), shared(&clock)).unwrap());
    ring.rotate().await.unwrap();
    let instance_a = TokenIssuer::new(store.clone(), Arc::clone(&ring), shared(&clock));
    let instance_b = TokenIssuer::new(store, ring, shared(&clock));

    let issued = instance_a.sign(&Claims::new("user-1", "cred-1")).await.unwrap();
    assert!(instance_b.verify(&issued.token).await.is_ok());

    assert!(instance_b.revoke(&issued.token).await.unwrap());
    assert_eq!(
        instance_a.verify(&issued.token).await.unwrap_err(),
        AuthError::InvalidToken
    );
}

/// **Verification fails closed when the store is down**
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_verification_fails_closed_on_store_outage() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let ring = Arc::new(KeyRing::new(TokenConfig::default(), shared(&clock)).unwrap());
    ring.rotate().await.unwrap();
    let issuer = TokenIssuer::new(store.clone(), ring, shared(&clock));

    let issued = issuer.sign(&Claims::new("user-1", "cred-1")).await.unwrap();
    store.set_failure(StoreFailure::Timeout);

    assert_eq!(
        issuer.verify(&issued.token).await.unwrap_err(),
        AuthError::InvalidToken
    );
}

/// **Rotation keeps outstanding tokens valid until their key expires**
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_rotation_preserves_outstanding_tokens() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let ring = Arc::new(KeyRing::new(TokenConfig::default(), shared(&clock)).unwrap());
    ring.rotate().await.unwrap();
    let issuer = TokenIssuer::new(store, Arc::clone(&ring), shared(&clock));

    let old = issuer.sign(&Claims::new("user-1", "cred-1")).await.unwrap();

    clock.advance(Duration::from_secs(24 * 60 * 60));
    assert!(ring.rotate_if_due().await.unwrap());
    assert_eq!(ring.key_state(&old.kid), Some(KeyState::Retired));

    let new = issuer.sign(&Claims::new("user-1", "cred-1")).await.unwrap();
    assert_ne!(new.kid, old.kid);

    // Old token: still signed by a live key, but its own exp has passed
    assert_eq!(
        issuer.verify(&old.token).await.unwrap_err(),
        AuthError::InvalidToken
    );
    assert!(issuer.verify(&new.token).await.is_ok());
    assert_eq!(issuer.publish_key_set().keys.len(), 2);

    // Retired key expires 48h after creation
    clock.advance(Duration::from_secs(24 * 60 * 60));
    ring.rotate_if_due().await.unwrap();
    assert_eq!(ring.key_state(&old.kid), None);
    assert!(issuer.publish_key_set().keys.iter().all(|k| k.kid != old.kid));
}

/// **Sixteenth attempt in a window is denied**
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_auth_rate_limit_denies_sixteenth_attempt() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let limiter = RateLimiter::new(store, shared(&clock));
    let policy = RateLimitPolicy::auth();

    for attempt in 1..=15 {
        let decision = limiter.check_policy(&policy, "203.0.113.7").await;
        assert!(decision.allowed, "attempt {attempt} should pass");
        assert_eq!(decision.remaining, 15 - attempt);
    }

    let denied = limiter.check_policy(&policy, "203.0.113.7").await;
    assert!(!denied.allowed);
    assert!(matches!(
        denied.into_result(),
        Err(AuthError::RateLimited { .. })
    ));

    // Other clients are unaffected
    assert!(limiter.check_policy(&policy, "198.51.100.2").await.allowed);

    // New window
    clock.advance(Duration::from_secs(15 * 60 + 1));
    assert!(limiter.check_policy(&policy, "203.0.113.7").await.allowed);
}

/// **Rate limiting fails open**
#[tokio::test]
async fn test_rate_limit_fails_open_on_store_outage() {
    let clock = MockClock::default();
    let store = MockSharedStore::with_clock(shared(&clock));
    let limiter = RateLimiter::new(store.clone(), shared(&clock));
    store.set_failure(StoreFailure::Unavailable);

    for _ in 0..50 {
        let decision = limiter.check_policy(&RateLimitPolicy::auth(), "203.0.113.7").await;
        assert!(decision.allowed);
        assert!(decision.degraded);
    }
}
