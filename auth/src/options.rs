//! WebAuthn ceremony options sent to the client.
//!
//! Shapes follow `PublicKeyCredentialCreationOptionsJSON` and
//! `PublicKeyCredentialRequestOptionsJSON`, so browsers can pass them to
//! `PublicKeyCredential.parseCreationOptionsFromJSON()` directly.

use crate::config::PasskeyConfig;
use crate::state::{Challenge, UserId};
use serde::{Deserialize, Serialize};

/// Client-side ceremony timeout in milliseconds.
pub const CEREMONY_TIMEOUT_MS: u64 = 60_000;

/// COSE algorithm ids accepted for new credentials: ES256, RS256.
pub const SUPPORTED_ALGORITHMS: [i32; 2] = [-7, -257];

/// Relying party entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    /// Display name.
    pub name: String,
    /// RP ID.
    pub id: String,
}

/// User entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle (base64url).
    pub id: String,
    /// Account name.
    pub name: String,
    /// Display name.
    pub display_name: String,
}

/// Accepted credential algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    /// Always "public-key".
    #[serde(rename = "type")]
    pub kind: String,
    /// COSE algorithm id.
    pub alg: i32,
}

/// Authenticator requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// "platform": built-in authenticators only.
    pub authenticator_attachment: String,
    /// "required": discoverable credentials.
    pub resident_key: String,
    /// Legacy form of `resident_key`.
    pub require_resident_key: bool,
    /// "preferred".
    pub user_verification: String,
}

/// Registration (creation) options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    /// Challenge (base64url).
    pub challenge: String,
    /// Relying party.
    pub rp: RelyingParty,
    /// User being registered.
    pub user: UserEntity,
    /// Accepted algorithms, in preference order.
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Ceremony timeout (ms).
    pub timeout: u64,
    /// Attestation conveyance, "none".
    pub attestation: String,
    /// Authenticator requirements.
    pub authenticator_selection: AuthenticatorSelection,
}

/// Login (request) options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOptions {
    /// Challenge (base64url).
    pub challenge: String,
    /// Ceremony timeout (ms).
    pub timeout: u64,
    /// RP ID.
    pub rp_id: String,
    /// Empty: discoverable credentials pick the account.
    pub allow_credentials: Vec<serde_json::Value>,
    /// "preferred".
    pub user_verification: String,
}

impl RegistrationOptions {
    /// Options for a registration challenge issued to `user_id`.
    #[must_use]
    pub fn new(config: &PasskeyConfig, challenge: &Challenge, user_id: &UserId, display_name: &str) -> Self {
        Self {
            challenge: challenge.value.clone(),
            rp: RelyingParty {
                name: config.rp_name.clone(),
                id: config.rp_id.clone(),
            },
            user: UserEntity {
                id: user_id.as_str().to_string(),
                name: display_name.to_string(),
                display_name: display_name.to_string(),
            },
            pub_key_cred_params: SUPPORTED_ALGORITHMS
                .iter()
                .map(|&alg| PubKeyCredParam {
                    kind: "public-key".to_string(),
                    alg,
                })
                .collect(),
            timeout: CEREMONY_TIMEOUT_MS,
            attestation: "none".to_string(),
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: "platform".to_string(),
                resident_key: "required".to_string(),
                require_resident_key: true,
                user_verification: "preferred".to_string(),
            },
        }
    }
}

impl LoginOptions {
    /// Options for a login challenge.
    #[must_use]
    pub fn new(config: &PasskeyConfig, challenge: &Challenge) -> Self {
        Self {
            challenge: challenge.value.clone(),
            timeout: CEREMONY_TIMEOUT_MS,
            rp_id: config.rp_id.clone(),
            allow_credentials: Vec::new(),
            user_verification: "preferred".to_string(),
        }
    }
}
