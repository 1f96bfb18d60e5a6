//! # Passkey Authentication
//!
//! Passkey (`WebAuthn`) ceremonies backed by a shared key-value store, with
//! rotating RS256 token issuance and fixed-window rate limiting.
//!
//! ## Components
//!
//! - [`ChallengeStore`]: single-use, TTL-bound ceremony challenges
//! - [`CredentialRegistry`]: registered passkeys and their signature counters
//! - [`RateLimiter`]: per-client fixed-window counters, fail-open
//! - [`KeyRing`] / [`TokenIssuer`]: rotating signing keys, sign/verify/revoke
//! - [`PasskeyOrchestrator`]: registration and login ceremonies
//!
//! Every component holds its state in a [`SharedStore`] (Redis in production),
//! so any number of stateless server instances can run side by side. Signing
//! keys are the exception: each instance owns its own [`KeyRing`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use passkey_auth::*;
//!
//! let store = RedisSharedStore::connect(RedisStoreConfig::new("redis://127.0.0.1:6379")).await?;
//! let keys = Arc::new(KeyRing::new(TokenConfig::default(), system_clock())?);
//! keys.rotate().await?;
//!
//! let auth = PasskeyOrchestrator::new(
//!     PasskeyConfig::new("https://example.com", "example.com"),
//!     store,
//!     RemoteWebAuthnVerifier::new("http://127.0.0.1:4000", Duration::from_secs(10))?,
//!     keys,
//!     system_clock(),
//! )?;
//!
//! let options = auth.issue_registration_challenge("alice").await?;
//! // ... client runs navigator.credentials.create(options) ...
//! let outcome = auth.start_registration(&response).await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod challenge;
pub mod config;
pub mod constants;
pub mod credential;
pub mod environment;
pub mod error;
pub mod keys;
pub mod options;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod rotation;
pub mod state;
pub mod stores;
pub mod token;
pub mod utils;

// Mocks for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use challenge::ChallengeStore;
pub use config::{PasskeyConfig, RateLimitPolicy, TokenConfig};
pub use credential::CredentialRegistry;
pub use environment::{Clock, SharedClock, SystemClock, system_clock};
pub use error::{AuthError, Result};
pub use keys::{JwkSet, KeyRing, KeyState, PublicJwk, SigningKey};
pub use options::{LoginOptions, RegistrationOptions};
pub use orchestrator::{AuthOutcome, PasskeyOrchestrator};
pub use providers::{
    AuthenticationResponse, RegistrationResponse, RemoteWebAuthnVerifier, SharedStore,
    WebAuthnVerifier,
};
pub use rate_limit::{RateDecision, RateLimiter};
pub use rotation::KeyRotationTask;
pub use state::{Challenge, ChallengePurpose, Credential, UserId};
pub use stores::{RedisSharedStore, RedisStoreConfig};
pub use token::{Claims, IssuedToken, TokenIssuer, TokenPayload};
