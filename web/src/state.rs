//! Application state for Axum handlers.

use crate::extractors::TrustedProxies;
use axum::extract::FromRef;
use passkey_auth::{PasskeyOrchestrator, RateLimitPolicy, RateLimiter};
use std::sync::Arc;

/// Rate-limit policies applied by the middleware.
#[derive(Debug, Clone)]
pub struct RateLimits {
    /// Every route.
    pub global: RateLimitPolicy,
    /// `/api/auth/*` on top of `global`.
    pub auth: RateLimitPolicy,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            global: RateLimitPolicy::global(),
            auth: RateLimitPolicy::auth(),
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Generic over the shared store `S` and verifier `V` so tests can run the
/// full router over in-memory mocks.
pub struct AppState<S, V> {
    /// Ceremony orchestrator.
    pub auth: Arc<PasskeyOrchestrator<S, V>>,

    /// Rate limiter over the same store.
    pub limiter: RateLimiter<S>,

    /// Policies for the rate-limit middleware.
    pub rate_limits: RateLimits,

    /// Apple app id published in the app-site-association document.
    pub app_id: Arc<str>,

    /// Proxies allowed to report the client address.
    pub trusted_proxies: TrustedProxies,
}

impl<S, V> AppState<S, V> {
    /// Create the state with the default rate-limit policies.
    #[must_use]
    pub fn new(
        auth: PasskeyOrchestrator<S, V>,
        limiter: RateLimiter<S>,
        app_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            auth: Arc::new(auth),
            limiter,
            rate_limits: RateLimits::default(),
            app_id: app_id.into(),
            trusted_proxies: TrustedProxies::none(),
        }
    }

    /// Override the rate-limit policies.
    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Believe forwarding headers from these proxies.
    #[must_use]
    pub fn with_trusted_proxies(mut self, trusted_proxies: TrustedProxies) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }
}

impl<S, V> FromRef<AppState<S, V>> for TrustedProxies {
    fn from_ref(state: &AppState<S, V>) -> Self {
        state.trusted_proxies.clone()
    }
}

// Manual impl: `V` only lives behind the `Arc`.
impl<S: Clone, V> Clone for AppState<S, V> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            limiter: self.limiter.clone(),
            rate_limits: self.rate_limits.clone(),
            app_id: Arc::clone(&self.app_id),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}
