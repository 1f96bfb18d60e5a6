//! Rotating RSA signing keys.
//!
//! # Key Lifecycle
//!
//! ```text
//! Generated → Current → Retired (verify-only) → Expired (purged)
//! ```
//!
//! - At most one key is Current; new tokens are signed with it.
//! - Every key that has not reached `expires_at` can verify tokens.
//! - Rotation installs a new Current key, demotes the previous one to Retired,
//!   and purges expired keys.
//!
//! # Concurrency
//!
//! The ring is an immutable [`Snapshot`] behind `RwLock<Arc<_>>`. Readers clone
//! the `Arc` and release the lock immediately; rotation builds a complete new
//! snapshot and swaps it in. Nobody ever observes a half-rotated ring, and the
//! lock is never held across an `.await`.

use crate::config::TokenConfig;
use crate::constants::metrics as metric_names;
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::utils::encode_b64url;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Signature algorithm advertised in the key set.
pub const JWK_ALG: &str = "RS256";

/// An RSA signing key.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    n: String,
    e: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a key pair. CPU-bound; call from a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` if the RSA library fails.
    pub fn generate(
        modulus_bits: usize,
        created_at: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, modulus_bits)
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))?;

        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let n = encode_b64url(private_key.n().to_bytes_be());
        let e = encode_b64url(private_key.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| AuthError::KeyGenerationFailed(err.to_string()))?;

        Ok(Self {
            kid: thumbprint(&n, &e),
            encoding_key,
            decoding_key,
            n,
            e,
            created_at,
            expires_at: created_at + lifetime,
        })
    }

    /// Key id (RFC 7638 thumbprint).
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time after which the key is purged and stops verifying.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> PublicJwk {
        PublicJwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            n: self.n.clone(),
            e: self.e.clone(),
            alg: JWK_ALG.to_string(),
            key_use: "sig".to_string(),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// RFC 7638 JWK thumbprint: SHA-256 over the canonical
/// `{"e","kty","n"}` JSON, base64url without padding.
fn thumbprint(n: &str, e: &str) -> String {
    let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);
    encode_b64url(Sha256::digest(canonical.as_bytes()))
}

/// One public key in the key set document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    /// Key type, always "RSA".
    pub kty: String,
    /// Key id.
    pub kid: String,
    /// Modulus, base64url.
    pub n: String,
    /// Public exponent, base64url.
    pub e: String,
    /// Algorithm, always "RS256".
    pub alg: String,
    /// Intended use, always "sig".
    #[serde(rename = "use")]
    pub key_use: String,
}

/// Public key set document (`/.well-known/jwks.json`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Every live key, newest first.
    pub keys: Vec<PublicJwk>,
}

/// Lifecycle state of a key as seen by the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Signs new tokens.
    Current,
    /// Verifies previously issued tokens only.
    Retired,
    /// Past `expires_at`; awaiting purge, verifies nothing.
    Expired,
}

/// Immutable view of the ring.
#[derive(Debug, Default)]
pub struct Snapshot {
    current: Option<Arc<SigningKey>>,
    keys: HashMap<String, Arc<SigningKey>>,
}

impl Snapshot {
    /// Copy of `self` without keys expired at `now`.
    fn purged(&self, now: DateTime<Utc>) -> Self {
        Self {
            current: self.current.clone().filter(|key| key.is_live(now)),
            keys: self
                .keys
                .iter()
                .filter(|(_, key)| key.is_live(now))
                .map(|(kid, key)| (kid.clone(), Arc::clone(key)))
                .collect(),
        }
    }
}

/// The process-wide key ring.
///
/// Share it as `Arc<KeyRing>`; it is mutated only by rotation.
pub struct KeyRing {
    snapshot: RwLock<Arc<Snapshot>>,
    rotation: tokio::sync::Mutex<()>,
    config: TokenConfig,
    clock: SharedClock,
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("snapshot", &self.snapshot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeyRing {
    /// Create an empty ring. Call [`KeyRing::rotate`] before signing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` violates the retention invariant.
    pub fn new(config: TokenConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            rotation: tokio::sync::Mutex::new(()),
            config,
            clock,
        })
    }

    /// Token and rotation settings.
    #[must_use]
    pub const fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Key to sign new tokens with.
    ///
    /// # Errors
    ///
    /// Returns `NoSigningKeyAvailable` if there is no live Current key.
    pub fn current_key(&self) -> Result<Arc<SigningKey>> {
        let now = self.clock.now();
        self.snapshot()
            .current
            .clone()
            .filter(|key| key.is_live(now))
            .ok_or(AuthError::NoSigningKeyAvailable)
    }

    /// Key able to verify a token tagged with `kid`, if it is still live.
    #[must_use]
    pub fn verification_key(&self, kid: &str) -> Option<Arc<SigningKey>> {
        let now = self.clock.now();
        self.snapshot()
            .keys
            .get(kid)
            .filter(|key| key.is_live(now))
            .cloned()
    }

    /// State of `kid`, or `None` once purged (or never known).
    #[must_use]
    pub fn key_state(&self, kid: &str) -> Option<KeyState> {
        let now = self.clock.now();
        let snapshot = self.snapshot();
        let key = snapshot.keys.get(kid)?;

        if !key.is_live(now) {
            Some(KeyState::Expired)
        } else if snapshot.current.as_ref().is_some_and(|current| current.kid == kid) {
            Some(KeyState::Current)
        } else {
            Some(KeyState::Retired)
        }
    }

    /// Public key set with every live key, newest first.
    #[must_use]
    pub fn key_set(&self) -> JwkSet {
        let now = self.clock.now();
        let snapshot = self.snapshot();

        let mut live: Vec<&Arc<SigningKey>> =
            snapshot.keys.values().filter(|key| key.is_live(now)).collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.kid.cmp(&b.kid)));

        JwkSet {
            keys: live.into_iter().map(|key| key.to_jwk()).collect(),
        }
    }

    /// Rotate if there is no Current key or it is at least `rotation_period` old.
    /// Expired keys are purged either way.
    ///
    /// # Returns
    ///
    /// `true` if a new key was installed.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` if a due rotation could not generate a key;
    /// the ring is left unchanged apart from purging.
    pub async fn rotate_if_due(&self) -> Result<bool> {
        let _guard = self.rotation.lock().await;
        let now = self.clock.now();
        let purged = self.snapshot().purged(now);

        let due = purged.current.as_ref().is_none_or(|current| {
            (now - current.created_at).to_std().unwrap_or_default() >= self.config.rotation_period
        });

        if due {
            self.install_new_key(purged).await?;
            return Ok(true);
        }

        if purged.keys.len() != self.snapshot().keys.len() {
            tracing::info!(live_keys = purged.keys.len(), "Purged expired signing keys");
            self.publish(purged);
        }
        Ok(false)
    }

    /// Rotate unconditionally (startup, operator action).
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` if key generation fails; the ring is unchanged.
    pub async fn rotate(&self) -> Result<()> {
        let _guard = self.rotation.lock().await;
        let purged = self.snapshot().purged(self.clock.now());
        self.install_new_key(purged).await
    }

    /// Generate a key and publish `base` plus the new key as Current.
    async fn install_new_key(&self, mut base: Snapshot) -> Result<()> {
        let now = self.clock.now();
        let bits = self.config.modulus_bits;
        let lifetime = chrono::Duration::from_std(self.config.key_lifetime)
            .map_err(|e| AuthError::ConfigError(format!("Key lifetime out of range: {e}")))?;

        let generated = tokio::task::spawn_blocking(move || SigningKey::generate(bits, now, lifetime))
            .await
            .map_err(|e| AuthError::KeyGenerationFailed(format!("Key generation task failed: {e}")))
            .and_then(|result| result);

        let key = match generated {
            Ok(key) => Arc::new(key),
            Err(e) => {
                tracing::error!(error = %e, "Signing key rotation failed");
                metrics::counter!(metric_names::KEY_ROTATION_FAILURES).increment(1);
                return Err(e);
            }
        };

        let retired = base.current.replace(Arc::clone(&key));
        base.keys.insert(key.kid.clone(), Arc::clone(&key));
        let live_keys = base.keys.len();
        self.publish(base);

        metrics::counter!(metric_names::KEY_ROTATIONS).increment(1);
        tracing::info!(
            kid = %key.kid,
            retired_kid = retired.as_ref().map(|k| k.kid.as_str()),
            expires_at = %key.expires_at,
            live_keys,
            "Rotated signing key"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::MockClock;
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn ring() -> (KeyRing, MockClock) {
        let clock = MockClock::default();
        let ring = KeyRing::new(TokenConfig::default(), Arc::new(clock.clone())).unwrap();
        (ring, clock)
    }

    #[test]
    fn test_rfc7638_thumbprint() {
        let n = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";
        assert_eq!(
            thumbprint(n, "AQAB"),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TokenConfig::default().with_key_lifetime(DAY);
        let err = KeyRing::new(config, Arc::new(MockClock::default())).unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_empty_ring_has_no_signing_key() {
        let (ring, _) = ring();
        assert_eq!(ring.current_key().unwrap_err(), AuthError::NoSigningKeyAvailable);
        assert!(ring.key_set().keys.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_if_due_installs_first_key_once() {
        let (ring, _) = ring();

        assert!(ring.rotate_if_due().await.unwrap());
        let key = ring.current_key().unwrap();
        assert_eq!(key.kid().len(), 43);
        assert_eq!(ring.key_state(key.kid()), Some(KeyState::Current));

        assert!(!ring.rotate_if_due().await.unwrap());
        assert_eq!(ring.current_key().unwrap().kid(), key.kid());
    }

    #[tokio::test]
    async fn test_lifecycle_current_retired_purged() {
        let (ring, clock) = ring();
        ring.rotate().await.unwrap();
        let first = ring.current_key().unwrap();

        clock.advance(DAY);
        assert!(ring.rotate_if_due().await.unwrap());
        let second = ring.current_key().unwrap();
        assert_ne!(first.kid(), second.kid());
        assert_eq!(ring.key_state(first.kid()), Some(KeyState::Retired));
        assert!(ring.verification_key(first.kid()).is_some());
        assert_eq!(ring.key_set().keys.len(), 2);
        assert_eq!(ring.key_set().keys[0].kid, second.kid());

        clock.advance(DAY);
        assert_eq!(ring.key_state(first.kid()), Some(KeyState::Expired));
        assert!(ring.verification_key(first.kid()).is_none());

        assert!(ring.rotate_if_due().await.unwrap());
        assert_eq!(ring.key_state(first.kid()), None);
        assert_eq!(ring.key_state(second.kid()), Some(KeyState::Retired));
        assert_eq!(ring.key_set().keys.len(), 2);
    }

    #[tokio::test]
    async fn test_key_set_document_shape() {
        let (ring, _) = ring();
        ring.rotate().await.unwrap();

        let json = serde_json::to_value(ring.key_set()).unwrap();
        let jwk = &json["keys"][0];
        assert_eq!(jwk["kty"], "RSA");
        assert_eq!(jwk["alg"], "RS256");
        assert_eq!(jwk["use"], "sig");
        assert_eq!(jwk["e"], "AQAB");
        assert!(!jwk["n"].as_str().unwrap().contains('='));
    }

    #[tokio::test]
    async fn test_readers_see_whole_snapshots_during_rotation() {
        let (ring, _) = ring();
        let ring = Arc::new(ring);
        ring.rotate().await.unwrap();

        let rotator = {
            let ring = Arc::clone(&ring);
            tokio::spawn(async move { ring.rotate().await })
        };

        for _ in 0..100 {
            let key = ring.current_key().unwrap();
            assert!(ring.verification_key(key.kid()).is_some());
            tokio::task::yield_now().await;
        }

        rotator.await.unwrap().unwrap();
        assert_eq!(ring.key_set().keys.len(), 2);
    }
}
