//! WebAuthn/Passkey verifier trait.
//!
//! Attestation and assertion cryptography is an external capability. The
//! orchestrator only extracts the challenge from the signed client data and
//! hands the ceremony response, together with the expected values, to an
//! injected [`WebAuthnVerifier`].

use crate::error::{AuthError, Result};
use crate::state::Credential;
use serde::{Deserialize, Serialize};

/// WebAuthn verifier.
///
/// # Implementation Notes
///
/// - [`RemoteWebAuthnVerifier`](super::RemoteWebAuthnVerifier) delegates to
///   an HTTP sidecar
/// - Implementations must reject counter rollbacks (a reported counter
///   `<=` the stored one when the authenticator supports counters)
/// - A rejected ceremony is reported either as `verified: false` or as
///   `VerificationFailed`; the orchestrator treats both the same
pub trait WebAuthnVerifier: Send + Sync {
    /// Verify a registration (attestation) response.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Attestation verification fails
    /// - Challenge, origin or RP ID mismatch
    /// - The verifier cannot be reached
    fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &ExpectedCeremony,
    ) -> impl std::future::Future<Output = Result<VerifiedRegistration>> + Send;

    /// Verify an authentication (assertion) response against a stored credential.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Signature is invalid
    /// - Counter rollback detected
    /// - Challenge, origin or RP ID mismatch
    /// - The verifier cannot be reached
    fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &ExpectedCeremony,
        credential: &Credential,
    ) -> impl std::future::Future<Output = Result<VerifiedAuthentication>> + Send;
}

/// Values the ceremony response must be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedCeremony {
    /// Challenge issued for this ceremony.
    pub expected_challenge: String,

    /// Relying party origin (e.g., "https://app.example.com").
    pub expected_origin: String,

    /// Relying party ID (e.g., "app.example.com").
    #[serde(rename = "expectedRPID")]
    pub expected_rp_id: String,
}

/// Registration verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRegistration {
    /// Whether the attestation verified.
    pub verified: bool,

    /// Credential ID (base64url).
    #[serde(rename = "credentialID")]
    pub credential_id: String,

    /// Public key (COSE format).
    #[serde(with = "crate::utils::b64url_bytes")]
    pub public_key: Vec<u8>,
}

/// Authentication verification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAuthentication {
    /// Whether the assertion verified.
    pub verified: bool,

    /// Signature counter reported by the authenticator.
    pub new_counter: u32,
}

// ═══════════════════════════════════════════════════════════════════════
// Ceremony responses (as produced by `navigator.credentials.*().toJSON()`)
// ═══════════════════════════════════════════════════════════════════════

/// Registration ceremony response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Credential ID (base64url).
    pub id: String,

    /// Raw credential ID (base64url).
    pub raw_id: String,

    /// Credential type, always "public-key".
    #[serde(rename = "type", default = "public_key_type")]
    pub kind: String,

    /// Authenticator attestation payload.
    pub response: AttestationPayload,

    /// Authenticator attachment ("platform" or "cross-platform").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,

    /// Client extension outputs, forwarded verbatim.
    #[serde(default)]
    pub client_extension_results: serde_json::Value,
}

/// Attestation payload of a registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationPayload {
    /// Client data JSON (base64url).
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// CBOR attestation object (base64url).
    pub attestation_object: String,

    /// Transports reported by the authenticator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Authentication ceremony response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    /// Credential ID (base64url).
    pub id: String,

    /// Raw credential ID (base64url).
    pub raw_id: String,

    /// Credential type, always "public-key".
    #[serde(rename = "type", default = "public_key_type")]
    pub kind: String,

    /// Authenticator assertion payload.
    pub response: AssertionPayload,

    /// Authenticator attachment ("platform" or "cross-platform").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,

    /// Client extension outputs, forwarded verbatim.
    #[serde(default)]
    pub client_extension_results: serde_json::Value,
}

/// Assertion payload of an authentication response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionPayload {
    /// Client data JSON (base64url).
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,

    /// Authenticator data (base64url).
    pub authenticator_data: String,

    /// Assertion signature (base64url).
    pub signature: String,

    /// User handle (base64url), present for discoverable credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

fn public_key_type() -> String {
    "public-key".to_string()
}

/// Decoded `clientDataJSON`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientData {
    /// "webauthn.create" or "webauthn.get".
    #[serde(rename = "type")]
    pub kind: String,

    /// Challenge echoed by the client (base64url).
    pub challenge: String,

    /// Origin the ceremony ran on.
    pub origin: String,
}

impl ClientData {
    /// Decode base64url `clientDataJSON`.
    ///
    /// Only the challenge is trusted by the caller, and only to look up the
    /// pending ceremony; the verifier re-checks the signed bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the payload is not base64 or not client data JSON.
    pub fn decode(client_data_json: &str) -> Result<Self> {
        let bytes = crate::utils::decode_b64_lenient(client_data_json)
            .ok_or_else(|| AuthError::InvalidRequest("clientDataJSON is not base64".into()))?;

        let client_data: Self = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidRequest(format!("Malformed clientDataJSON: {e}")))?;

        if client_data.challenge.is_empty() {
            return Err(AuthError::InvalidRequest(
                "clientDataJSON carries no challenge".into(),
            ));
        }

        Ok(client_data)
    }
}

impl RegistrationResponse {
    /// Challenge echoed in the signed client data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the client data cannot be decoded.
    pub fn challenge(&self) -> Result<String> {
        ClientData::decode(&self.response.client_data_json).map(|data| data.challenge)
    }
}

impl AuthenticationResponse {
    /// Challenge echoed in the signed client data.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the client data cannot be decoded.
    pub fn challenge(&self) -> Result<String> {
        ClientData::decode(&self.response.client_data_json).map(|data| data.challenge)
    }
}
