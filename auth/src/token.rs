//! RS256 bearer tokens.
//!
//! # Token Format
//!
//! ```text
//! header:  {"alg": "RS256", "typ": "JWT", "kid": "<signing key thumbprint>"}
//! payload: {"sub": "<user id>", "credentialID": "<credential id>", ...extra,
//!           "iat": <unix secs>, "exp": <unix secs>, "jti": "<32 hex chars>"}
//! ```
//!
//! # Revocation
//!
//! Every issued token has a `token:{jti}` entry whose TTL matches the token's
//! lifetime. A token verifies only while that entry exists, so deleting it
//! revokes the token immediately.
//!
//! # Verification
//!
//! Header, key lookup, signature, expiry and revocation failures all return
//! the same `InvalidToken`; the specific reason is only logged at debug level.

use crate::constants::{keys, metrics as metric_names};
use crate::environment::SharedClock;
use crate::error::{AuthError, Result};
use crate::keys::{JwkSet, KeyRing};
use crate::providers::SharedStore;
use crate::utils::decode_b64_lenient;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Claim names the issuer sets itself.
pub const RESERVED_CLAIMS: [&str; 3] = ["iat", "exp", "jti"];

/// Caller-supplied claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,

    /// Credential the session was established with.
    #[serde(rename = "credentialID")]
    pub credential_id: String,

    /// Additional application claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Claims for a passkey session.
    #[must_use]
    pub fn new(sub: impl Into<String>, credential_id: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            credential_id: credential_id.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add an application claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    fn check_reserved(&self) -> Result<()> {
        let collision = self
            .extra
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()) || *name == "sub" || *name == "credentialID");

        match collision {
            Some(name) => Err(AuthError::ReservedClaim(name.clone())),
            None => Ok(()),
        }
    }
}

/// Verified token payload: the caller's claims plus issuer-set fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Caller-supplied claims.
    #[serde(flatten)]
    pub claims: Claims,

    /// Issued at (unix seconds).
    pub iat: i64,

    /// Expiry (unix seconds).
    pub exp: i64,

    /// Token id, key of the revocation entry.
    pub jti: String,
}

/// A freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Compact JWT.
    pub token: String,

    /// Token id.
    pub jti: String,

    /// Signing key id.
    pub kid: String,

    /// Issued at.
    pub issued_at: DateTime<Utc>,

    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct UnverifiedJti {
    jti: Option<String>,
}

/// Token issuer over a [`KeyRing`] and a revocation [`SharedStore`].
#[derive(Clone)]
pub struct TokenIssuer<S> {
    store: S,
    keys: Arc<KeyRing>,
    clock: SharedClock,
}

impl<S: SharedStore> TokenIssuer<S> {
    /// Create a token issuer.
    #[must_use]
    pub fn new(store: S, keys: Arc<KeyRing>, clock: SharedClock) -> Self {
        Self { store, keys, clock }
    }

    /// The key ring backing this issuer.
    #[must_use]
    pub const fn key_ring(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    fn revocation_key(jti: &str) -> String {
        format!("{}{jti}", keys::TOKEN)
    }

    /// Sign `claims` with the Current key and record the revocation entry.
    ///
    /// The expiry is `now + token_lifetime`, capped at the signing key's own
    /// expiry so no token outlives the key that verifies it.
    ///
    /// # Errors
    ///
    /// - `ReservedClaim` if `claims.extra` uses `iat`, `exp`, `jti`, `sub` or `credentialID`
    /// - `NoSigningKeyAvailable` if the ring has no Current key
    /// - `StoreUnavailable`/`StoreTimeout` if the revocation entry cannot be written
    pub async fn sign(&self, claims: &Claims) -> Result<IssuedToken> {
        claims.check_reserved()?;

        let key = self.keys.current_key().inspect_err(|_| {
            tracing::error!("No signing key available; key rotation is not running");
        })?;

        let issued_at = self.clock.now();
        let lifetime = chrono::Duration::from_std(self.keys.config().token_lifetime)
            .map_err(|e| AuthError::ConfigError(format!("Token lifetime out of range: {e}")))?;
        let expires_at = (issued_at + lifetime).min(key.expires_at());

        let jti = uuid::Uuid::new_v4().simple().to_string();
        let payload = TokenPayload {
            claims: claims.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: jti.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());

        let token = jsonwebtoken::encode(&header, &payload, key.encoding_key())
            .map_err(|e| AuthError::InternalError(format!("Failed to sign token: {e}")))?;

        let ttl = (expires_at - issued_at)
            .to_std()
            .map_err(|_| AuthError::NoSigningKeyAvailable)?;
        self.store
            .set(
                &Self::revocation_key(&jti),
                keys::TOKEN_VALID.to_vec(),
                Some(ttl),
            )
            .await?;

        metrics::counter!(metric_names::TOKENS_ISSUED).increment(1);
        tracing::debug!(
            sub = %claims.sub,
            kid = %key.kid(),
            jti = %jti,
            expires_at = %expires_at,
            "Issued bearer token"
        );

        Ok(IssuedToken {
            token,
            jti,
            kid: key.kid().to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Verify a token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for every failure.
    pub async fn verify(&self, token: &str) -> Result<TokenPayload> {
        self.check(token).await.map_err(|reason| {
            tracing::debug!(reason, "Token rejected");
            AuthError::InvalidToken
        })
    }

    async fn check(&self, token: &str) -> std::result::Result<TokenPayload, &'static str> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| "malformed header")?;
        if header.alg != Algorithm::RS256 {
            return Err("unexpected algorithm");
        }

        let kid = header.kid.ok_or("missing kid")?;
        let key = self
            .keys
            .verification_key(&kid)
            .ok_or("unknown, retired-and-expired, or purged key")?;

        // Expiry is checked against the injected clock below
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;

        let payload = jsonwebtoken::decode::<TokenPayload>(token, key.decoding_key(), &validation)
            .map_err(|_| "bad signature or payload")?
            .claims;

        if payload.exp <= self.clock.now().timestamp() {
            return Err("expired");
        }

        match self.store.get(&Self::revocation_key(&payload.jti)).await {
            Ok(Some(_)) => Ok(payload),
            Ok(None) => Err("revoked"),
            Err(e) => {
                tracing::warn!(error = %e, "Revocation store unavailable during verification");
                Err("revocation store unavailable")
            }
        }
    }

    /// Revoke a token by deleting its revocation entry.
    ///
    /// The signature and expiry are not checked; only the `jti` is read.
    /// Idempotent.
    ///
    /// # Returns
    ///
    /// `true` if an entry existed. Malformed tokens return `false`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let Some(jti) = unverified_jti(token) else {
            tracing::debug!("Revoke called with a malformed token");
            return Ok(false);
        };

        let existed = self.store.delete(&Self::revocation_key(&jti)).await?;
        if existed {
            metrics::counter!(metric_names::TOKENS_REVOKED).increment(1);
            tracing::info!(jti = %jti, "Revoked bearer token");
        }
        Ok(existed)
    }

    /// Public key set for relying parties.
    #[must_use]
    pub fn publish_key_set(&self) -> JwkSet {
        self.keys.key_set()
    }
}

/// Read `jti` from the payload segment without verifying anything.
fn unverified_jti(token: &str) -> Option<String> {
    let mut segments = token.split('.');
    let (_, payload, _, None) = (
        segments.next()?,
        segments.next()?,
        segments.next()?,
        segments.next(),
    ) else {
        return None;
    };

    let bytes = decode_b64_lenient(payload)?;
    serde_json::from_slice::<UnverifiedJti>(&bytes)
        .ok()?
        .jti
        .filter(|jti| !jti.is_empty())
}
