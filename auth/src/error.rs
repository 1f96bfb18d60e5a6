//! Error types for passkey authentication and token operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the authentication core.
///
/// Store, verifier, and signing-library errors are converted into these
/// variants at the component boundary so callers never see raw backend errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Ceremony Errors
    // ═══════════════════════════════════════════════════════════

    /// Challenge expired, already consumed, or never issued.
    ///
    /// The three cases are indistinguishable to callers.
    #[error("Challenge not found")]
    ChallengeNotFound,

    /// No credential registered under the claimed id.
    #[error("Credential not found")]
    CredentialNotFound,

    /// A credential with this id is already registered.
    #[error("Credential already exists")]
    CredentialAlreadyExists,

    /// The external WebAuthn verifier rejected the ceremony response.
    #[error("Verification failed: {reason}")]
    VerificationFailed {
        /// Reason for failure (logged, never shown to clients)
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════

    /// The key ring has no current signing key.
    ///
    /// Indicates a configuration or rotation fault; operators should be alerted.
    #[error("No signing key available")]
    NoSigningKeyAvailable,

    /// Token failed header, key, signature, expiry, or revocation checks.
    #[error("Invalid token")]
    InvalidToken,

    /// Caller-supplied claims collide with a reserved claim name.
    #[error("Reserved claim: {0}")]
    ReservedClaim(String),

    /// RSA key pair generation failed.
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════

    /// Too many requests in the current window.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Duration until the current window resets
        retry_after: std::time::Duration,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Shared store unreachable or a command failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A shared-store command exceeded its timeout.
    #[error("Store timeout: {0}")]
    StoreTimeout(String),

    /// Malformed request input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` for failures that must look identical to clients.
    ///
    /// Challenge misses, credential misses and verifier rejections are all
    /// reported as a generic authentication failure to prevent enumeration.
    ///
    /// # Examples
    ///
    /// ```
    /// # use passkey_auth::AuthError;
    /// assert!(AuthError::CredentialNotFound.is_authentication_failure());
    /// assert!(AuthError::ChallengeNotFound.is_authentication_failure());
    /// assert!(!AuthError::InvalidToken.is_authentication_failure());
    /// ```
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::ChallengeNotFound
                | Self::CredentialNotFound
                | Self::VerificationFailed { .. }
        )
    }

    /// Returns `true` if the shared store could not serve the request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use passkey_auth::AuthError;
    /// assert!(AuthError::StoreTimeout("GET".into()).is_store_failure());
    /// assert!(!AuthError::InvalidToken.is_store_failure());
    /// ```
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::StoreTimeout(_))
    }

    /// Returns `true` if this error indicates a misconfigured deployment.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoSigningKeyAvailable | Self::ConfigError(_) | Self::KeyGenerationFailed(_)
        )
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<bincode::Error> for AuthError {
    fn from(e: bincode::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures_share_a_class() {
        let failures = [
            AuthError::ChallengeNotFound,
            AuthError::CredentialNotFound,
            AuthError::VerificationFailed {
                reason: "bad signature".into(),
            },
        ];
        assert!(failures.iter().all(AuthError::is_authentication_failure));
        assert!(!AuthError::RateLimited {
            retry_after: std::time::Duration::from_secs(1)
        }
        .is_authentication_failure());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(AuthError::NoSigningKeyAvailable.is_fatal());
        assert!(!AuthError::StoreUnavailable("down".into()).is_fatal());
    }
}
