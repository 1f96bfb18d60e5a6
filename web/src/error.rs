//! Error types for web handlers.
//!
//! [`AppError`] is the only error type handlers return. Domain errors are
//! converted once, in `From<AuthError>`, so every route renders the same
//! status, code and message for the same failure.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use passkey_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable code for every failed ceremony.
pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";

/// Stable code for rate-limit rejections.
pub const RATE_LIMITED: &str = "RATE_LIMITED";

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState<S, V>>) -> Result<Json<LoginOptions>, AppError> {
///     Ok(Json(state.auth.issue_login_challenge().await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Sent as `Retry-After` when set
    retry_after: Option<Duration>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            retry_after: None,
            source: None,
        }
    }

    /// Attach the underlying error (logged, never rendered).
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 for any failed ceremony. Deliberately carries no detail.
    #[must_use]
    pub fn authentication_failed() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            AUTHENTICATION_FAILED,
            "Authentication failed",
        )
    }

    /// 401 for a missing, malformed, expired or revoked bearer token.
    #[must_use]
    pub fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Invalid token")
    }

    /// 429 Too Many Requests with `Retry-After`.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        let mut error = Self::new(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED, message);
        error.retry_after = Some(retry_after);
        error
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            message,
        )
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Error code (for client error handling).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(status = %self.status, code = self.code, "Request failed"),
            }
        }

        let retry_after = self.retry_after;
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(ceil_secs(retry_after)));
        }
        response
    }
}

/// Whole seconds, rounded up.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Indistinguishable on the wire: no enumeration of challenges or credentials
            AuthError::ChallengeNotFound
            | AuthError::CredentialNotFound
            | AuthError::CredentialAlreadyExists
            | AuthError::VerificationFailed { .. } => {
                tracing::info!(error = %err, "Authentication failed");
                Self::authentication_failed()
            }
            AuthError::InvalidToken => Self::invalid_token(),
            AuthError::InvalidRequest(message) => Self::bad_request(message),
            AuthError::ReservedClaim(claim) => {
                Self::bad_request(format!("Claim '{claim}' is reserved"))
            }
            AuthError::RateLimited { retry_after } => {
                Self::rate_limited("Too many requests, please try again later.", retry_after)
            }
            AuthError::StoreUnavailable(_) | AuthError::StoreTimeout(_) => {
                Self::unavailable("Service temporarily unavailable").with_source(err.into())
            }
            AuthError::NoSigningKeyAvailable
            | AuthError::KeyGenerationFailed(_)
            | AuthError::SerializationError(_)
            | AuthError::ConfigError(_)
            | AuthError::InternalError(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_authentication_failures_render_identically() {
        let errors = [
            AuthError::ChallengeNotFound,
            AuthError::CredentialNotFound,
            AuthError::CredentialAlreadyExists,
            AuthError::VerificationFailed {
                reason: "bad signature".into(),
            },
        ]
        .map(AppError::from);

        for err in &errors {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.code(), AUTHENTICATION_FAILED);
            assert_eq!(err.message(), "Authentication failed");
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::from(AuthError::RateLimited {
            retry_after: Duration::from_millis(1500),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "2");
    }

    #[test]
    fn test_store_failures_are_unavailable() {
        let err = AppError::from(AuthError::StoreTimeout("GET".into()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal_errors_hide_detail() {
        let err = AppError::from(AuthError::NoSigningKeyAvailable);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "An internal error occurred");
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::from_millis(3001)), 4);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
