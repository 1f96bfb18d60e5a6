//! Authentication state types.
//!
//! Records persisted in the shared store. Everything here is `Clone` and
//! serializable; the components that own each record decide the encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Opaque WebAuthn user handle.
///
/// 32 random bytes, base64url-encoded. Used as the token `sub` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::utils::random_token(32))
    }

    /// Borrow the encoded handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Challenges
// ═══════════════════════════════════════════════════════════════════════

/// Ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengePurpose {
    /// Credential creation (`navigator.credentials.create()`).
    Registration,

    /// Assertion (`navigator.credentials.get()`).
    Login,
}

/// A pending WebAuthn challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge string (base64url, also the store lookup key).
    pub value: String,

    /// Ceremony this challenge belongs to.
    pub purpose: ChallengePurpose,

    /// User the registration is for. `None` for discoverable logins.
    pub subject_user_id: Option<UserId>,

    /// Display name captured at registration time.
    pub display_name: Option<String>,

    /// Challenge created timestamp.
    pub created_at: DateTime<Utc>,

    /// Challenge expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Credentials
// ═══════════════════════════════════════════════════════════════════════

/// A registered passkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential ID (base64url, as reported by the authenticator).
    pub id: String,

    /// Owning user.
    pub owner_user_id: UserId,

    /// Display name supplied at registration.
    pub display_name: Option<String>,

    /// Public key (COSE format).
    #[serde(with = "crate::utils::b64url_bytes")]
    pub public_key: Vec<u8>,

    /// Signature counter (replay protection).
    pub counter: u32,

    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}
