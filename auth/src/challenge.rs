//! Single-use WebAuthn challenges.
//!
//! # Security
//!
//! Challenges are:
//! - **Single-use**: consumed with one atomic get-and-delete
//! - **Ephemeral**: expire after the configured TTL (default 150 s)
//! - **Unpredictable**: 32 bytes from the OS CSPRNG
//!
//! A missing, consumed and expired challenge all produce the same
//! `ChallengeNotFound`, and so does a store timeout during consumption: a
//! get-and-delete that may or may not have run cannot be retried safely, so the
//! client restarts the ceremony instead.

use crate::constants::keys;
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::providers::SharedStore;
use crate::state::{Challenge, ChallengePurpose, UserId};
use crate::utils::random_token;
use std::time::Duration;

/// Random bytes per challenge.
const CHALLENGE_BYTES: usize = 32;

/// Attempts to find an unused challenge value before giving up.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Challenge store over a [`SharedStore`].
#[derive(Clone)]
pub struct ChallengeStore<S> {
    store: S,
    clock: SharedClock,
    ttl: Duration,
}

impl<S: SharedStore> ChallengeStore<S> {
    /// Create a challenge store issuing challenges that live for `ttl`.
    #[must_use]
    pub fn new(store: S, clock: SharedClock, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Challenge time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(value: &str) -> String {
        format!("{}{value}", keys::CHALLENGE)
    }

    /// Mint and persist a new challenge.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable`/`StoreTimeout` if the challenge cannot be persisted.
    pub async fn issue(
        &self,
        purpose: ChallengePurpose,
        subject_user_id: Option<UserId>,
        display_name: Option<String>,
    ) -> Result<Challenge> {
        let created_at = self.clock.now();
        let expires_at = created_at
            + chrono::Duration::from_std(self.ttl)
                .map_err(|e| AuthError::ConfigError(format!("Challenge TTL out of range: {e}")))?;

        let mut challenge = Challenge {
            value: String::new(),
            purpose,
            subject_user_id,
            display_name,
            created_at,
            expires_at,
        };

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            challenge.value = random_token(CHALLENGE_BYTES);
            let bytes = bincode::serialize(&challenge)?;

            if self
                .store
                .set_if_absent(&Self::key(&challenge.value), bytes, Some(self.ttl))
                .await?
            {
                tracing::debug!(
                    purpose = ?challenge.purpose,
                    ttl_secs = self.ttl.as_secs(),
                    "Issued WebAuthn challenge"
                );
                return Ok(challenge);
            }
        }

        Err(AuthError::InternalError(
            "Could not allocate a unique challenge value".into(),
        ))
    }

    /// Atomically retrieve and delete a challenge.
    ///
    /// Among concurrent consumers of the same value exactly one succeeds.
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFound` if the challenge is absent, consumed, expired, or
    ///   the store timed out
    /// - `StoreUnavailable` if the store could not be reached
    pub async fn consume(&self, value: &str) -> Result<Challenge> {
        if value.is_empty() {
            return Err(AuthError::ChallengeNotFound);
        }

        let bytes = match self.store.get_del(&Self::key(value)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(AuthError::ChallengeNotFound),
            Err(AuthError::StoreTimeout(command)) => {
                tracing::warn!(%command, "Challenge consume timed out, treating as not found");
                return Err(AuthError::ChallengeNotFound);
            }
            Err(e) => return Err(e),
        };

        let challenge: Challenge = bincode::deserialize(&bytes).map_err(|e| {
            tracing::warn!(error = %e, "Discarding undecodable challenge record");
            AuthError::ChallengeNotFound
        })?;

        // Double-check expiry (TTL should handle this)
        if challenge.expires_at <= self.clock.now() {
            tracing::debug!("Challenge expired before consumption");
            return Err(AuthError::ChallengeNotFound);
        }

        tracing::debug!(purpose = ?challenge.purpose, "Consumed WebAuthn challenge (single-use)");
        Ok(challenge)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::{MockClock, MockSharedStore, StoreFailure};
    use std::sync::Arc;

    fn challenges() -> (ChallengeStore<MockSharedStore>, MockSharedStore, MockClock) {
        let clock = MockClock::default();
        let store = MockSharedStore::with_clock(Arc::new(clock.clone()));
        let challenges =
            ChallengeStore::new(store.clone(), Arc::new(clock.clone()), Duration::from_secs(150));
        (challenges, store, clock)
    }

    #[tokio::test]
    async fn test_issue_and_consume() {
        let (challenges, _, _) = challenges();
        let user = UserId::generate();

        let issued = challenges
            .issue(
                ChallengePurpose::Registration,
                Some(user.clone()),
                Some("alice".into()),
            )
            .await
            .unwrap();
        assert_eq!(issued.value.len(), 43);
        assert_eq!(
            issued.expires_at - issued.created_at,
            chrono::Duration::seconds(150)
        );

        let consumed = challenges.consume(&issued.value).await.unwrap();
        assert_eq!(consumed, issued);
        assert_eq!(consumed.subject_user_id, Some(user));
    }

    #[tokio::test]
    async fn test_second_consume_not_found() {
        let (challenges, _, _) = challenges();
        let issued = challenges
            .issue(ChallengePurpose::Login, None, None)
            .await
            .unwrap();

        challenges.consume(&issued.value).await.unwrap();
        assert_eq!(
            challenges.consume(&issued.value).await,
            Err(AuthError::ChallengeNotFound)
        );
    }

    #[tokio::test]
    async fn test_consume_after_ttl_not_found() {
        let (challenges, _, clock) = challenges();
        let issued = challenges
            .issue(ChallengePurpose::Login, None, None)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(150));
        assert_eq!(
            challenges.consume(&issued.value).await,
            Err(AuthError::ChallengeNotFound)
        );
    }

    #[tokio::test]
    async fn test_unknown_and_empty_values_not_found() {
        let (challenges, _, _) = challenges();
        assert_eq!(
            challenges.consume("never-issued").await,
            Err(AuthError::ChallengeNotFound)
        );
        assert_eq!(challenges.consume("").await, Err(AuthError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn test_timeout_during_consume_is_not_found() {
        let (challenges, store, _) = challenges();
        let issued = challenges
            .issue(ChallengePurpose::Login, None, None)
            .await
            .unwrap();

        store.set_failure(StoreFailure::Timeout);
        assert_eq!(
            challenges.consume(&issued.value).await,
            Err(AuthError::ChallengeNotFound)
        );
    }

    #[tokio::test]
    async fn test_store_outage() {
        let (challenges, store, _) = challenges();
        store.set_failure(StoreFailure::Unavailable);

        let err = challenges
            .issue(ChallengePurpose::Login, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));

        let err = challenges.consume("anything").await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_single_winner() {
        let (challenges, _, _) = challenges();
        let issued = challenges
            .issue(ChallengePurpose::Login, None, None)
            .await
            .unwrap();

        let mut handles = vec![];
        for _ in 0..10 {
            let challenges = challenges.clone();
            let value = issued.value.clone();
            handles.push(tokio::spawn(
                async move { challenges.consume(&value).await },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert_eq!(e, AuthError::ChallengeNotFound),
            }
        }
        assert_eq!(winners, 1);
    }
}
