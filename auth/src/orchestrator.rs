//! Passkey ceremonies.
//!
//! # Registration
//!
//! ```text
//! issue_registration_challenge(display_name)
//!   → ChallengeStore::issue(Registration, new user id, display name)
//!   → client: navigator.credentials.create()
//! start_registration(response)
//!   → challenge from clientDataJSON → ChallengeStore::consume
//!   → WebAuthnVerifier::verify_registration
//!   → CredentialRegistry::store (counter 0)
//!   → TokenIssuer::sign({sub: user id, credentialID})
//! ```
//!
//! # Login
//!
//! ```text
//! issue_login_challenge()
//!   → ChallengeStore::issue(Login)
//!   → client: navigator.credentials.get()
//! start_login(response)
//!   → ChallengeStore::consume → CredentialRegistry::get(response.id)
//!   → WebAuthnVerifier::verify_authentication (stored key + counter)
//!   → CredentialRegistry::update_counter
//!   → TokenIssuer::sign({sub: owner, credentialID})
//! ```
//!
//! Nothing is persisted when verification fails. Ceremonies are not
//! transactional: a consumed challenge stays consumed even if a later step
//! fails, and the client starts over.

use crate::challenge::ChallengeStore;
use crate::config::PasskeyConfig;
use crate::constants::metrics as metric_names;
use crate::credential::CredentialRegistry;
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::keys::{JwkSet, KeyRing};
use crate::options::{LoginOptions, RegistrationOptions};
use crate::providers::{
    AuthenticationResponse, ExpectedCeremony, RegistrationResponse, SharedStore, WebAuthnVerifier,
};
use crate::state::{Challenge, ChallengePurpose, UserId};
use crate::token::{Claims, IssuedToken, TokenIssuer, TokenPayload};
use std::future::Future;
use std::sync::Arc;

/// Result of a completed ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Signed bearer token.
    pub token: IssuedToken,

    /// Authenticated user.
    pub user_id: UserId,

    /// Credential used.
    pub credential_id: String,
}

/// Composes challenges, credentials, verification and tokens into the two
/// passkey ceremonies.
///
/// Cheap to clone when `S` and `V` are; construct once at startup and share.
#[derive(Clone)]
pub struct PasskeyOrchestrator<S, V> {
    config: PasskeyConfig,
    challenges: ChallengeStore<S>,
    credentials: CredentialRegistry<S>,
    tokens: TokenIssuer<S>,
    verifier: V,
}

impl<S, V> PasskeyOrchestrator<S, V>
where
    S: SharedStore + Clone,
    V: WebAuthnVerifier,
{
    /// Wire the ceremony components over one shared store.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` is invalid.
    pub fn new(
        config: PasskeyConfig,
        store: S,
        verifier: V,
        keys: Arc<KeyRing>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            challenges: ChallengeStore::new(store.clone(), clock.clone(), config.challenge_ttl),
            credentials: CredentialRegistry::new(store.clone(), clock.clone()),
            tokens: TokenIssuer::new(store, keys, clock),
            verifier,
            config,
        })
    }

    /// Ceremony configuration.
    #[must_use]
    pub const fn config(&self) -> &PasskeyConfig {
        &self.config
    }

    /// Challenge store.
    #[must_use]
    pub const fn challenges(&self) -> &ChallengeStore<S> {
        &self.challenges
    }

    /// Credential registry.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialRegistry<S> {
        &self.credentials
    }

    /// Token issuer.
    #[must_use]
    pub const fn tokens(&self) -> &TokenIssuer<S> {
        &self.tokens
    }

    fn expected(&self, challenge: &str) -> ExpectedCeremony {
        ExpectedCeremony {
            expected_challenge: challenge.to_string(),
            expected_origin: self.config.origin.clone(),
            expected_rp_id: self.config.rp_id.clone(),
        }
    }

    /// Bound a verifier call by `verifier_timeout`.
    async fn bounded<T>(&self, call: impl Future<Output = Result<T>> + Send) -> Result<T> {
        tokio::time::timeout(self.config.verifier_timeout, call)
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(
                    timeout_ms = self.config.verifier_timeout.as_millis(),
                    "WebAuthn verifier timed out"
                );
                Err(AuthError::VerificationFailed {
                    reason: "Verifier timed out".into(),
                })
            })
    }

    /// Consume the challenge echoed in the client data and require `purpose`.
    async fn take_challenge(
        &self,
        value: &str,
        purpose: ChallengePurpose,
    ) -> Result<Challenge> {
        let challenge = self.challenges.consume(value).await?;
        if challenge.purpose != purpose {
            tracing::warn!(
                expected = ?purpose,
                actual = ?challenge.purpose,
                "Challenge used for the wrong ceremony"
            );
            return Err(AuthError::ChallengeNotFound);
        }
        Ok(challenge)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════

    /// Start a registration: new user id, Registration challenge, creation options.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `display_name` is blank
    /// - `StoreUnavailable`/`StoreTimeout` if the challenge cannot be stored
    pub async fn issue_registration_challenge(&self, display_name: &str) -> Result<RegistrationOptions> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::InvalidRequest("displayName is required".into()));
        }

        let user_id = UserId::generate();
        let challenge = self
            .challenges
            .issue(
                ChallengePurpose::Registration,
                Some(user_id.clone()),
                Some(display_name.to_string()),
            )
            .await?;

        tracing::info!(user_id = %user_id, "Issued registration challenge");
        Ok(RegistrationOptions::new(
            &self.config,
            &challenge,
            &user_id,
            display_name,
        ))
    }

    /// Complete a registration.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the client data is malformed
    /// - `ChallengeNotFound` if the challenge is unknown, used, expired, or for login
    /// - `VerificationFailed` if the verifier rejects the response or times out
    /// - `CredentialAlreadyExists` if the credential id is taken
    /// - `NoSigningKeyAvailable` if no token can be signed
    pub async fn start_registration(&self, response: &RegistrationResponse) -> Result<AuthOutcome> {
        let result = self.register(response).await;
        record_ceremony("registration", &result);
        result
    }

    async fn register(&self, response: &RegistrationResponse) -> Result<AuthOutcome> {
        let value = response.challenge()?;
        let challenge = self
            .take_challenge(&value, ChallengePurpose::Registration)
            .await?;
        let user_id = challenge
            .subject_user_id
            .ok_or(AuthError::ChallengeNotFound)?;

        let verified = self
            .bounded(
                self.verifier
                    .verify_registration(response, &self.expected(&value)),
            )
            .await?;

        if !verified.verified {
            return Err(AuthError::VerificationFailed {
                reason: "Registration verification failed".into(),
            });
        }

        let credential = self
            .credentials
            .store(
                &verified.credential_id,
                user_id.clone(),
                challenge.display_name,
                verified.public_key,
            )
            .await?;

        let token = self
            .tokens
            .sign(&Claims::new(user_id.as_str(), credential.id.as_str()))
            .await?;

        tracing::info!(
            user_id = %user_id,
            credential_id = %credential.id,
            "Passkey registration completed"
        );

        Ok(AuthOutcome {
            token,
            user_id,
            credential_id: credential.id,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Login
    // ═══════════════════════════════════════════════════════════════════

    /// Start a login: Login challenge and request options.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable`/`StoreTimeout` if the challenge cannot be stored.
    pub async fn issue_login_challenge(&self) -> Result<LoginOptions> {
        let challenge = self
            .challenges
            .issue(ChallengePurpose::Login, None, None)
            .await?;

        tracing::debug!("Issued login challenge");
        Ok(LoginOptions::new(&self.config, &challenge))
    }

    /// Complete a login.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the client data is malformed
    /// - `ChallengeNotFound` if the challenge is unknown, used, expired, or for registration
    /// - `CredentialNotFound` if the credential id was never registered
    /// - `VerificationFailed` if the verifier rejects the assertion or times out
    /// - `NoSigningKeyAvailable` if no token can be signed
    pub async fn start_login(&self, response: &AuthenticationResponse) -> Result<AuthOutcome> {
        let result = self.login(response).await;
        record_ceremony("login", &result);
        result
    }

    async fn login(&self, response: &AuthenticationResponse) -> Result<AuthOutcome> {
        let value = response.challenge()?;
        self.take_challenge(&value, ChallengePurpose::Login).await?;

        let credential = self.credentials.get(&response.id).await?;

        let verified = self
            .bounded(self.verifier.verify_authentication(
                response,
                &self.expected(&value),
                &credential,
            ))
            .await?;

        if !verified.verified {
            return Err(AuthError::VerificationFailed {
                reason: "Login verification failed".into(),
            });
        }

        let counter = self
            .credentials
            .update_counter(&credential.id, verified.new_counter)
            .await?;

        let token = self
            .tokens
            .sign(&Claims::new(
                credential.owner_user_id.as_str(),
                credential.id.as_str(),
            ))
            .await?;

        tracing::info!(
            user_id = %credential.owner_user_id,
            credential_id = %credential.id,
            counter,
            "Passkey login completed"
        );

        Ok(AuthOutcome {
            token,
            user_id: credential.owner_user_id,
            credential_id: credential.id,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Tokens
    // ═══════════════════════════════════════════════════════════════════

    /// Verify a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for every failure.
    pub async fn verify_token(&self, token: &str) -> Result<TokenPayload> {
        self.tokens.verify(token).await
    }

    /// Revoke a bearer token.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    pub async fn revoke_token(&self, token: &str) -> Result<bool> {
        self.tokens.revoke(token).await
    }

    /// Public key set.
    #[must_use]
    pub fn publish_key_set(&self) -> JwkSet {
        self.tokens.publish_key_set()
    }
}

fn record_ceremony(ceremony: &'static str, result: &Result<AuthOutcome>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) if e.is_authentication_failure() => "rejected",
        Err(_) => "error",
    };

    if let Err(e) = result {
        tracing::debug!(ceremony, error = %e, "Ceremony failed");
    }

    metrics::counter!(metric_names::CEREMONIES, "ceremony" => ceremony, "outcome" => outcome)
        .increment(1);
}
