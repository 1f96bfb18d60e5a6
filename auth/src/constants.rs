//! Authentication constants.
//!
//! Shared-store key layout and metric names used throughout the crate.

/// Shared-store key prefixes.
pub mod keys {
    /// Pending ceremony challenges: `challenge:{value}`.
    pub const CHALLENGE: &str = "challenge:";

    /// Registered credentials: `credential:{id}`.
    pub const CREDENTIAL: &str = "credential:";

    /// Revocation entries: `token:{jti}`.
    pub const TOKEN: &str = "token:";

    /// Value stored in a revocation entry.
    pub const TOKEN_VALID: &[u8] = b"valid";
}

/// Metric names.
pub mod metrics {
    /// Tokens signed.
    pub const TOKENS_ISSUED: &str = "passkey_auth_tokens_issued_total";

    /// Tokens revoked (entry existed).
    pub const TOKENS_REVOKED: &str = "passkey_auth_tokens_revoked_total";

    /// Requests denied by a rate-limit policy.
    pub const RATE_LIMIT_REJECTED: &str = "passkey_auth_rate_limit_rejected_total";

    /// Rate-limit checks answered fail-open because the store failed.
    pub const RATE_LIMIT_DEGRADED: &str = "passkey_auth_rate_limit_degraded_total";

    /// Successful key rotations.
    pub const KEY_ROTATIONS: &str = "passkey_auth_key_rotations_total";

    /// Failed key rotations.
    pub const KEY_ROTATION_FAILURES: &str = "passkey_auth_key_rotation_failures_total";

    /// Completed ceremonies, labelled by `ceremony` and `outcome`.
    pub const CEREMONIES: &str = "passkey_auth_ceremonies_total";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixes() {
        let key = format!("{}{}", keys::CHALLENGE, "abc");
        assert_eq!(key, "challenge:abc");
        assert_eq!(keys::TOKEN, "token:");
    }
}
