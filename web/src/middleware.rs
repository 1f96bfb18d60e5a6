//! Fixed-window rate limiting middleware.
//!
//! Two layers share one [`RateLimiter`](passkey_auth::RateLimiter): the global
//! policy wraps every route and the auth policy wraps `/api/auth/*`. Each
//! counts the request, then sets:
//!
//! | Header | Value |
//! |---|---|
//! | `X-RateLimit-Limit` | window limit |
//! | `X-RateLimit-Remaining` | attempts left |
//! | `X-RateLimit-Reset` | window end, unix seconds |
//! | `Retry-After` | seconds until window end |
//!
//! When both layers apply, the innermost (auth) values win. Store failures
//! never block a request; the limiter degrades to allow.
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/health", get(health_check))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), global_rate_limit::<S, V>));
//! ```

use crate::error::{AppError, ceil_secs};
use crate::extractors::ClientIp;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use passkey_auth::{RateDecision, RateLimitPolicy, SharedStore};

/// Window limit header.
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Remaining attempts header.
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Window reset (unix seconds) header.
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Global policy, applied to every route.
pub async fn global_rate_limit<S, V>(
    State(state): State<AppState<S, V>>,
    client: ClientIp,
    request: Request,
    next: Next,
) -> Response
where
    S: SharedStore + Clone + 'static,
    V: Send + Sync + 'static,
{
    let policy = &state.rate_limits.global;
    enforce(
        &state,
        policy,
        "Too many requests, please try again later.",
        client,
        request,
        next,
    )
    .await
}

/// Auth policy, applied to `/api/auth/*`.
pub async fn auth_rate_limit<S, V>(
    State(state): State<AppState<S, V>>,
    client: ClientIp,
    request: Request,
    next: Next,
) -> Response
where
    S: SharedStore + Clone + 'static,
    V: Send + Sync + 'static,
{
    let policy = &state.rate_limits.auth;
    enforce(
        &state,
        policy,
        "Too many authentication attempts, please try again later.",
        client,
        request,
        next,
    )
    .await
}

async fn enforce<S, V>(
    state: &AppState<S, V>,
    policy: &RateLimitPolicy,
    message: &'static str,
    ClientIp(ip): ClientIp,
    request: Request,
    next: Next,
) -> Response
where
    S: SharedStore + Clone + 'static,
    V: Send + Sync + 'static,
{
    let decision = state.limiter.check_policy(policy, &ip.to_string()).await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::info!(
            client_ip = %ip,
            scope = %policy.scope,
            path = %request.uri().path(),
            "Request rejected by rate limiter"
        );
        AppError::rate_limited(message, decision.reset_after).into_response()
    };

    set_missing(response.headers_mut(), &decision);
    response
}

/// Insert rate-limit headers not already set by an inner layer.
fn set_missing(headers: &mut HeaderMap, decision: &RateDecision) {
    let values = [
        (RATE_LIMIT_LIMIT, u64::from(decision.limit)),
        (RATE_LIMIT_REMAINING, u64::from(decision.remaining)),
        (
            RATE_LIMIT_RESET,
            u64::try_from(decision.reset_at.timestamp()).unwrap_or_default(),
        ),
        (RETRY_AFTER, ceil_secs(decision.reset_after)),
    ];

    for (name, value) in values {
        headers.entry(name).or_insert(HeaderValue::from(value));
    }
}
