//! Passkey ceremony and token endpoints under `/api/auth`.
//!
//! ```text
//! GET  /api/auth/challenge/register?displayName=…   → RegistrationOptions
//! POST /api/auth/register-passkey  {attestationResponse}     → AuthResponse
//! GET  /api/auth/challenge/login                     → LoginOptions
//! POST /api/auth/login-passkey     {authenticationResponse}  → AuthResponse
//! POST /api/auth/revoke            Authorization: Bearer …   → {revoked}
//! ```

use crate::error::AppError;
use crate::extractors::BearerToken;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
};
use passkey_auth::{
    AuthOutcome, AuthenticationResponse, LoginOptions, RegistrationOptions, RegistrationResponse,
    SharedStore, WebAuthnVerifier,
};
use serde::{Deserialize, Serialize};

/// Query for the registration challenge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationChallengeQuery {
    /// Name shown by the authenticator.
    pub display_name: Option<String>,
}

/// Body of `POST /register-passkey`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPasskeyRequest {
    /// Output of `navigator.credentials.create()`.
    pub attestation_response: RegistrationResponse,
}

/// Body of `POST /login-passkey`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPasskeyRequest {
    /// Output of `navigator.credentials.get()`.
    pub authentication_response: AuthenticationResponse,
}

/// Successful ceremony.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    /// Always `true`; failures are error bodies.
    pub success: bool,
    /// Bearer token.
    pub token: String,
    /// Authenticated user.
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Credential used.
    #[serde(rename = "credentialID")]
    pub credential_id: String,
}

impl From<AuthOutcome> for AuthResponse {
    fn from(outcome: AuthOutcome) -> Self {
        Self {
            success: true,
            token: outcome.token.token,
            user_id: outcome.user_id.0,
            credential_id: outcome.credential_id,
        }
    }
}

/// Result of `POST /revoke`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevokeResponse {
    /// `false` if the token was already revoked or expired from the store.
    pub revoked: bool,
}

fn bad_json(rejection: &JsonRejection) -> AppError {
    tracing::debug!(error = %rejection, "Rejected request body");
    AppError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
}

/// `GET /challenge/register?displayName=…`
///
/// # Errors
///
/// 400 if `displayName` is missing or blank.
pub async fn registration_challenge<S, V>(
    State(state): State<AppState<S, V>>,
    query: Result<Query<RegistrationChallengeQuery>, QueryRejection>,
) -> Result<Json<RegistrationOptions>, AppError>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let display_name = query
        .ok()
        .and_then(|Query(q)| q.display_name)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("displayName is required as a query parameter"))?;

    let options = state.auth.issue_registration_challenge(&display_name).await?;
    Ok(Json(options))
}

/// `POST /register-passkey`
///
/// # Errors
///
/// 401 `AUTHENTICATION_FAILED` for any ceremony failure, including a
/// credential id that is already registered.
pub async fn register_passkey<S, V>(
    State(state): State<AppState<S, V>>,
    body: Result<Json<RegisterPasskeyRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let Json(request) = body.map_err(|e| bad_json(&e))?;
    let outcome = state
        .auth
        .start_registration(&request.attestation_response)
        .await?;
    Ok(Json(outcome.into()))
}

/// `GET /challenge/login`
///
/// # Errors
///
/// 503 if the challenge cannot be stored.
pub async fn login_challenge<S, V>(
    State(state): State<AppState<S, V>>,
) -> Result<Json<LoginOptions>, AppError>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    Ok(Json(state.auth.issue_login_challenge().await?))
}

/// `POST /login-passkey`
///
/// # Errors
///
/// 401 `AUTHENTICATION_FAILED` for any ceremony failure, including an
/// unregistered credential.
pub async fn login_passkey<S, V>(
    State(state): State<AppState<S, V>>,
    body: Result<Json<LoginPasskeyRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let Json(request) = body.map_err(|e| bad_json(&e))?;
    let outcome = state
        .auth
        .start_login(&request.authentication_response)
        .await?;
    Ok(Json(outcome.into()))
}

/// `POST /revoke`
///
/// Only a currently valid token can revoke itself.
///
/// # Errors
///
/// 401 `INVALID_TOKEN` if the bearer token does not verify.
pub async fn revoke<S, V>(
    State(state): State<AppState<S, V>>,
    BearerToken(token): BearerToken,
) -> Result<Json<RevokeResponse>, AppError>
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let payload = state.auth.verify_token(&token).await?;
    let revoked = state.auth.revoke_token(&token).await?;

    tracing::info!(sub = %payload.claims.sub, jti = %payload.jti, revoked, "Token revoked");
    Ok(Json(RevokeResponse { revoked }))
}
