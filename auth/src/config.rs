//! Authentication configuration.
//!
//! Configuration values are provided by the application; the defaults mirror
//! the production deployment (150 s challenges, 24 h tokens, 24 h rotation,
//! 48 h key lifetime).

use crate::error::{AuthError, Result};
use std::time::Duration;

/// WebAuthn/Passkey ceremony configuration.
#[derive(Debug, Clone)]
pub struct PasskeyConfig {
    /// Expected origin for WebAuthn (e.g., "https://app.example.com").
    ///
    /// Must match the origin in the client-side WebAuthn call.
    pub origin: String,

    /// Relying Party ID (e.g., "app.example.com").
    ///
    /// Must be a bare domain, without scheme.
    pub rp_id: String,

    /// Relying Party display name shown by authenticators.
    pub rp_name: String,

    /// Challenge time-to-live.
    ///
    /// Default: 150 seconds
    pub challenge_ttl: Duration,

    /// Upper bound on a single verifier call.
    ///
    /// Default: 10 seconds
    pub verifier_timeout: Duration,
}

impl PasskeyConfig {
    /// Create new Passkey configuration.
    ///
    /// # Arguments
    ///
    /// * `origin` - Expected origin (e.g., "https://app.example.com")
    /// * `rp_id` - Relying Party ID (e.g., "app.example.com")
    #[must_use]
    pub fn new(origin: impl Into<String>, rp_id: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim().to_string(),
            rp_id: rp_id.into().trim().to_lowercase(),
            rp_name: "Passkey Authentication".to_string(),
            challenge_ttl: Duration::from_secs(150),
            verifier_timeout: Duration::from_secs(10),
        }
    }

    /// Set relying party display name.
    #[must_use]
    pub fn with_rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.rp_name = rp_name.into();
        self
    }

    /// Set challenge time-to-live.
    #[must_use]
    pub const fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    /// Set verifier call timeout.
    #[must_use]
    pub const fn with_verifier_timeout(mut self, timeout: Duration) -> Self {
        self.verifier_timeout = timeout;
        self
    }

    /// Validate origin and RP ID format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the RP ID contains a scheme, the origin is
    /// not HTTPS, or the challenge TTL is zero.
    pub fn validate(&self) -> Result<()> {
        if self.rp_id.is_empty() {
            return Err(AuthError::ConfigError("RP ID must not be empty".into()));
        }
        if self.rp_id.contains("://") {
            return Err(AuthError::ConfigError(format!(
                "RP ID should not include a protocol: {}",
                self.rp_id
            )));
        }
        if !self.origin.starts_with("https://") {
            return Err(AuthError::ConfigError(format!(
                "Origin must use HTTPS: {}",
                self.origin
            )));
        }
        if self.challenge_ttl.is_zero() {
            return Err(AuthError::ConfigError("Challenge TTL must be positive".into()));
        }
        Ok(())
    }
}

/// Token issuance and signing-key rotation configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Lifetime of issued bearer tokens.
    ///
    /// Default: 24 hours
    pub token_lifetime: Duration,

    /// Age at which the current signing key is replaced.
    ///
    /// Default: 24 hours
    pub rotation_period: Duration,

    /// How often the rotation task checks whether rotation is due.
    ///
    /// Default: 1 hour
    pub rotation_check_interval: Duration,

    /// Lifetime of a signing key from creation until it is purged.
    ///
    /// Default: 48 hours
    pub key_lifetime: Duration,

    /// RSA modulus size in bits.
    ///
    /// Default: 2048
    pub modulus_bits: usize,
}

impl TokenConfig {
    /// Set token lifetime.
    #[must_use]
    pub const fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Set rotation period.
    #[must_use]
    pub const fn with_rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    /// Set rotation check interval.
    #[must_use]
    pub const fn with_rotation_check_interval(mut self, interval: Duration) -> Self {
        self.rotation_check_interval = interval;
        self
    }

    /// Set signing key lifetime.
    #[must_use]
    pub const fn with_key_lifetime(mut self, lifetime: Duration) -> Self {
        self.key_lifetime = lifetime;
        self
    }

    /// Validate the retention invariant.
    ///
    /// A key must outlive every token it can sign: it stays current for up to
    /// `rotation_period`, and the last token it signs lives `token_lifetime`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `key_lifetime < rotation_period + token_lifetime`,
    /// any duration is zero, or the modulus is smaller than 2048 bits.
    pub fn validate(&self) -> Result<()> {
        if self.token_lifetime.is_zero()
            || self.rotation_period.is_zero()
            || self.rotation_check_interval.is_zero()
        {
            return Err(AuthError::ConfigError(
                "Token lifetime, rotation period and check interval must be positive".into(),
            ));
        }
        if self.key_lifetime < self.rotation_period + self.token_lifetime {
            return Err(AuthError::ConfigError(format!(
                "Key lifetime {:?} must cover rotation period {:?} plus token lifetime {:?}",
                self.key_lifetime, self.rotation_period, self.token_lifetime
            )));
        }
        if self.modulus_bits < 2048 {
            return Err(AuthError::ConfigError(format!(
                "RSA modulus must be at least 2048 bits, got {}",
                self.modulus_bits
            )));
        }
        Ok(())
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(24 * 60 * 60),
            rotation_period: Duration::from_secs(24 * 60 * 60),
            rotation_check_interval: Duration::from_secs(60 * 60),
            key_lifetime: Duration::from_secs(48 * 60 * 60),
            modulus_bits: 2048,
        }
    }
}

/// Fixed-window rate limit policy for one endpoint class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Scope name, part of the counter key.
    pub scope: String,

    /// Window length.
    pub window: Duration,

    /// Maximum attempts per window.
    pub limit: u32,
}

impl RateLimitPolicy {
    /// Create a new policy.
    #[must_use]
    pub fn new(scope: impl Into<String>, window: Duration, limit: u32) -> Self {
        Self {
            scope: scope.into(),
            window,
            limit,
        }
    }

    /// Global policy: 100 requests per 15 minutes.
    #[must_use]
    pub fn global() -> Self {
        Self::new("rate-limit", Duration::from_secs(15 * 60), 100)
    }

    /// Authentication endpoints: 15 requests per 15 minutes.
    #[must_use]
    pub fn auth() -> Self {
        Self::new("auth-rate-limit", Duration::from_secs(15 * 60), 15)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passkey_config_builder() {
        let config = PasskeyConfig::new(" https://example.com ", "Example.COM")
            .with_rp_name("Example")
            .with_challenge_ttl(Duration::from_secs(60))
            .with_verifier_timeout(Duration::from_secs(3));

        assert_eq!(config.origin, "https://example.com");
        assert_eq!(config.rp_id, "example.com");
        assert_eq!(config.rp_name, "Example");
        assert_eq!(config.challenge_ttl, Duration::from_secs(60));
        assert_eq!(config.verifier_timeout, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_passkey_config_rejects_scheme_in_rp_id() {
        let config = PasskeyConfig::new("https://example.com", "https://example.com");
        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_passkey_config_requires_https_origin() {
        let config = PasskeyConfig::new("http://example.com", "example.com");
        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_default_token_config_is_valid() {
        let config = TokenConfig::default();
        assert_eq!(config.token_lifetime, Duration::from_secs(86_400));
        assert_eq!(config.key_lifetime, Duration::from_secs(172_800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_config_rejects_short_key_lifetime() {
        let config = TokenConfig::default().with_key_lifetime(Duration::from_secs(36 * 60 * 60));
        assert!(matches!(config.validate(), Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_rate_limit_presets() {
        assert_eq!(RateLimitPolicy::auth().limit, 15);
        assert_eq!(RateLimitPolicy::global().limit, 100);
        assert_eq!(RateLimitPolicy::auth().window, Duration::from_secs(900));
    }
}
