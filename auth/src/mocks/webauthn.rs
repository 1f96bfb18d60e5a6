//! Mock `WebAuthn` verifier for testing.
//!
//! Simulates ceremony verification without actual crypto: a response is
//! accepted when its client data echoes the expected challenge and origin.

use crate::error::{AuthError, Result};
use crate::providers::webauthn::{
    AssertionPayload, AttestationPayload, AuthenticationResponse, ClientData, ExpectedCeremony,
    RegistrationResponse, VerifiedAuthentication, VerifiedRegistration, WebAuthnVerifier,
};
use crate::state::Credential;
use crate::utils::encode_b64url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Public key the mock reports for every registration.
pub const MOCK_PUBLIC_KEY: &[u8] = &[0xa5, 0x01, 0x02, 0x03, 0x26];

/// Origin used by the response builders below.
pub const MOCK_ORIGIN: &str = "https://example.com";

#[derive(Debug, Default)]
struct Behaviour {
    reject_with: Option<String>,
    next_counter: Option<u32>,
    delay: Option<Duration>,
}

/// Mock `WebAuthn` verifier.
#[derive(Debug, Clone, Default)]
pub struct MockWebAuthnVerifier {
    behaviour: Arc<Mutex<Behaviour>>,
    calls: Arc<AtomicUsize>,
}

impl MockWebAuthnVerifier {
    /// Create a verifier that accepts well-formed responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every ceremony with `VerificationFailed`.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn reject_all(&self, reason: impl Into<String>) {
        self.behaviour.lock().unwrap().reject_with = Some(reason.into());
    }

    /// Counter reported by the next authentications (default: stored + 1).
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn report_counter(&self, counter: u32) {
        self.behaviour.lock().unwrap().next_counter = Some(counter);
    }

    /// Sleep before answering (simulates a hung verifier).
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn delay(&self, by: Duration) {
        self.behaviour.lock().unwrap().delay = Some(by);
    }

    /// Number of verification calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    async fn prelude(&self) -> Result<Option<u32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (reject_with, next_counter, delay) = {
            let behaviour = self.behaviour.lock().unwrap();
            (
                behaviour.reject_with.clone(),
                behaviour.next_counter,
                behaviour.delay,
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reject_with {
            Some(reason) => Err(AuthError::VerificationFailed { reason }),
            None => Ok(next_counter),
        }
    }

    fn client_data_matches(client_data_json: &str, expected: &ExpectedCeremony) -> bool {
        ClientData::decode(client_data_json).is_ok_and(|data| {
            data.challenge == expected.expected_challenge && data.origin == expected.expected_origin
        })
    }
}

impl WebAuthnVerifier for MockWebAuthnVerifier {
    async fn verify_registration(
        &self,
        response: &RegistrationResponse,
        expected: &ExpectedCeremony,
    ) -> Result<VerifiedRegistration> {
        self.prelude().await?;

        Ok(VerifiedRegistration {
            verified: Self::client_data_matches(&response.response.client_data_json, expected),
            credential_id: response.id.clone(),
            public_key: MOCK_PUBLIC_KEY.to_vec(),
        })
    }

    async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        expected: &ExpectedCeremony,
        credential: &Credential,
    ) -> Result<VerifiedAuthentication> {
        let next_counter = self.prelude().await?;

        let new_counter = next_counter.unwrap_or_else(|| credential.counter.saturating_add(1));
        let verified = Self::client_data_matches(&response.response.client_data_json, expected)
            && response.id == credential.id
            && new_counter > credential.counter;

        Ok(VerifiedAuthentication {
            verified,
            new_counter,
        })
    }
}

fn client_data_json(kind: &str, challenge: &str) -> String {
    encode_b64url(
        serde_json::json!({
            "type": kind,
            "challenge": challenge,
            "origin": MOCK_ORIGIN,
            "crossOrigin": false,
        })
        .to_string(),
    )
}

/// Build a registration response echoing `challenge`.
#[must_use]
pub fn registration_response(challenge: &str, credential_id: &str) -> RegistrationResponse {
    RegistrationResponse {
        id: credential_id.to_string(),
        raw_id: credential_id.to_string(),
        kind: "public-key".to_string(),
        response: AttestationPayload {
            client_data_json: client_data_json("webauthn.create", challenge),
            attestation_object: encode_b64url(b"mock-attestation"),
            transports: vec!["internal".to_string()],
        },
        authenticator_attachment: Some("platform".to_string()),
        client_extension_results: serde_json::json!({}),
    }
}

/// Build an authentication response echoing `challenge`.
#[must_use]
pub fn authentication_response(challenge: &str, credential_id: &str) -> AuthenticationResponse {
    AuthenticationResponse {
        id: credential_id.to_string(),
        raw_id: credential_id.to_string(),
        kind: "public-key".to_string(),
        response: AssertionPayload {
            client_data_json: client_data_json("webauthn.get", challenge),
            authenticator_data: encode_b64url(b"mock-authenticator-data"),
            signature: encode_b64url(b"mock-signature"),
            user_handle: None,
        },
        authenticator_attachment: Some("platform".to_string()),
        client_extension_results: serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::state::UserId;

    fn expected(challenge: &str) -> ExpectedCeremony {
        ExpectedCeremony {
            expected_challenge: challenge.into(),
            expected_origin: MOCK_ORIGIN.into(),
            expected_rp_id: "example.com".into(),
        }
    }

    fn credential(counter: u32) -> Credential {
        Credential {
            id: "cred-1".into(),
            owner_user_id: UserId("user".into()),
            display_name: None,
            public_key: MOCK_PUBLIC_KEY.to_vec(),
            counter,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_registration_bound_to_challenge() {
        let verifier = MockWebAuthnVerifier::new();
        let response = registration_response("abc", "cred-1");

        let ok = verifier
            .verify_registration(&response, &expected("abc"))
            .await
            .unwrap();
        assert!(ok.verified);
        assert_eq!(ok.credential_id, "cred-1");

        let wrong = verifier
            .verify_registration(&response, &expected("other"))
            .await
            .unwrap();
        assert!(!wrong.verified);
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_counter_rollback_not_verified() {
        let verifier = MockWebAuthnVerifier::new();
        let response = authentication_response("abc", "cred-1");

        let result = verifier
            .verify_authentication(&response, &expected("abc"), &credential(4))
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(result.new_counter, 5);

        verifier.report_counter(3);
        let result = verifier
            .verify_authentication(&response, &expected("abc"), &credential(4))
            .await
            .unwrap();
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_reject_all() {
        let verifier = MockWebAuthnVerifier::new();
        verifier.reject_all("bad attestation");

        let err = verifier
            .verify_registration(&registration_response("abc", "c"), &expected("abc"))
            .await
            .unwrap_err();
        assert!(err.is_authentication_failure());
    }
}
