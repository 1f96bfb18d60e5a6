//! HTTP-delegating WebAuthn verifier.
//!
//! Posts ceremony responses to a verification service that owns the
//! attestation/assertion cryptography. The service is stateless: everything it
//! needs travels in the request.
//!
//! # Contract
//!
//! `POST {base_url}/verify-registration`
//!
//! ```json
//! {
//!   "response": { "id": "…", "rawId": "…", "type": "public-key",
//!                 "response": { "clientDataJSON": "…", "attestationObject": "…" } },
//!   "expectedChallenge": "…",
//!   "expectedOrigin": "https://example.com",
//!   "expectedRPID": "example.com"
//! }
//! ```
//!
//! replies `200 {"verified": bool, "credentialID": "…", "publicKey": "<base64url COSE key>"}`.
//!
//! `POST {base_url}/verify-authentication`
//!
//! ```json
//! {
//!   "response": { "id": "…", "rawId": "…", "type": "public-key",
//!                 "response": { "clientDataJSON": "…", "authenticatorData": "…",
//!                               "signature": "…", "userHandle": "…" } },
//!   "expectedChallenge": "…",
//!   "expectedOrigin": "https://example.com",
//!   "expectedRPID": "example.com",
//!   "credential": { "credentialID": "…", "publicKey": "<base64url>", "counter": 7 }
//! }
//! ```
//!
//! replies `200 {"verified": bool, "newCounter": u32}`. The service must
//! report `verified: false` (or a non-2xx status) for a counter that does not
//! advance past `credential.counter` when the authenticator supports counters.
//!
//! `response` is the browser's `PublicKeyCredential.toJSON()` output, passed
//! through unchanged, so any WebAuthn server library (e.g.
//! `@simplewebauthn/server`'s `verifyRegistrationResponse` /
//! `verifyAuthenticationResponse`) can back the service directly.
//!
//! # Failures
//!
//! An unreachable service, a timeout, a non-2xx status and a reply that does
//! not match the shapes above are all reported as `VerificationFailed`, which
//! clients see as an ordinary authentication failure.

use crate::error::{AuthError, Result};
use crate::providers::webauthn::{
    AuthenticationResponse, ExpectedCeremony, RegistrationResponse, VerifiedAuthentication,
    VerifiedRegistration, WebAuthnVerifier,
};
use crate::state::Credential;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Remote WebAuthn verifier.
///
/// # Example
///
/// ```no_run
/// use passkey_auth::providers::RemoteWebAuthnVerifier;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), passkey_auth::AuthError> {
/// let verifier = RemoteWebAuthnVerifier::new("http://127.0.0.1:4000", Duration::from_secs(10))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RemoteWebAuthnVerifier {
    /// Sidecar base URL, without trailing slash.
    base_url: String,

    /// HTTP client for making requests.
    http_client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest<'a> {
    response: &'a RegistrationResponse,
    #[serde(flatten)]
    expected: &'a ExpectedCeremony,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticationRequest<'a> {
    response: &'a AuthenticationResponse,
    #[serde(flatten)]
    expected: &'a ExpectedCeremony,
    credential: StoredCredential<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential<'a> {
    #[serde(rename = "credentialID")]
    credential_id: &'a str,
    public_key: String,
    counter: u32,
}

impl RemoteWebAuthnVerifier {
    /// Create a new remote verifier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL is empty or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AuthError::ConfigError(
                "WebAuthn verifier URL must not be empty".into(),
            ));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::VerificationFailed {
                reason: format!("Verifier request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %error_body, path, "Verifier rejected ceremony");
            return Err(AuthError::VerificationFailed {
                reason: format!("Verifier returned {status}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::VerificationFailed {
                reason: format!("Malformed verifier reply: {e}"),
            })
    }
}

impl WebAuthnVerifier for RemoteWebAuthnVerifier {
    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &ExpectedCeremony,
    ) -> Result<VerifiedRegistration> {
        self.post(
            "verify-registration",
            &RegistrationRequest { response, expected },
        )
        .await
    }

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &ExpectedCeremony,
        credential: &Credential,
    ) -> Result<VerifiedAuthentication> {
        let request = AuthenticationRequest {
            response,
            expected,
            credential: StoredCredential {
                credential_id: &credential.id,
                public_key: crate::utils::encode_b64url(&credential.public_key),
                counter: credential.counter,
            },
        };

        self.post("verify-authentication", &request).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let verifier =
            RemoteWebAuthnVerifier::new("http://verifier.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(verifier.base_url, "http://verifier.local");
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            RemoteWebAuthnVerifier::new("", Duration::from_secs(1)),
            Err(AuthError::ConfigError(_))
        ));
    }

    #[test]
    fn test_registration_request_flattens_expected_values() {
        let response: RegistrationResponse = serde_json::from_value(serde_json::json!({
            "id": "cred",
            "rawId": "cred",
            "response": {"clientDataJSON": "e30", "attestationObject": "AA"}
        }))
        .unwrap();
        let expected = ExpectedCeremony {
            expected_challenge: "c".into(),
            expected_origin: "https://example.com".into(),
            expected_rp_id: "example.com".into(),
        };

        let body = serde_json::to_value(RegistrationRequest {
            response: &response,
            expected: &expected,
        })
        .unwrap();

        assert_eq!(body["expectedRPID"], "example.com");
        assert_eq!(body["response"]["type"], "public-key");
    }
}
