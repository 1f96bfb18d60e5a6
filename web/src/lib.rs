//! Axum HTTP surface for passkey authentication.
//!
//! A thin shell over [`passkey_auth::PasskeyOrchestrator`]: extract, call,
//! map the result. All state lives in the shared store, so any number of
//! instances can sit behind one load balancer.
//!
//! # Routes
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ request id · trace span · global rate limit  │  every route
//! ├──────────────────────────────────────────────┤
//! │ auth rate limit                              │  /api/auth/*
//! │   GET  /challenge/register?displayName=…     │
//! │   POST /register-passkey                     │
//! │   GET  /challenge/login                      │
//! │   POST /login-passkey                        │
//! │   POST /revoke                               │
//! ├──────────────────────────────────────────────┤
//! │ GET /.well-known/jwks.json                   │
//! │ GET /.well-known/apple-app-site-association  │
//! │ GET /health                                  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use passkey_auth_web::{AppState, router};
//!
//! let state = AppState::new(orchestrator, RateLimiter::new(store, clock), "TEAM.com.example.app");
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//! axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, TrustedProxies};
pub use state::{AppState, RateLimits};

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use passkey_auth::{SharedStore, WebAuthnVerifier};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
pub fn router<S, V>(state: AppState<S, V>) -> Router
where
    S: SharedStore + Clone + 'static,
    V: WebAuthnVerifier + 'static,
{
    let auth_routes = Router::new()
        .route(
            "/challenge/register",
            get(handlers::auth::registration_challenge::<S, V>),
        )
        .route(
            "/register-passkey",
            post(handlers::auth::register_passkey::<S, V>),
        )
        .route(
            "/challenge/login",
            get(handlers::auth::login_challenge::<S, V>),
        )
        .route("/login-passkey", post(handlers::auth::login_passkey::<S, V>))
        .route("/revoke", post(handlers::auth::revoke::<S, V>))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_rate_limit::<S, V>,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .route("/.well-known/jwks.json", get(handlers::well_known::jwks::<S, V>))
        .route(
            "/.well-known/apple-app-site-association",
            get(handlers::well_known::apple_app_site_association::<S, V>),
        )
        .route("/health", get(handlers::health_check))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::global_rate_limit::<S, V>,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
