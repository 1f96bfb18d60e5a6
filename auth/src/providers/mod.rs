//! Authentication providers.
//!
//! This module defines traits for the external collaborators of the
//! authentication core. These traits enable dependency injection and make
//! the ceremony and token logic testable.
//!
//! # Architecture
//!
//! Providers are **interfaces**, not implementations. The components depend
//! on these traits, and the binary wires in concrete implementations.
//!
//! ```text
//! ┌──────────────────────┐        ┌─────────────────────┐
//! │ PasskeyOrchestrator  │──────▶ │ WebAuthnVerifier    │  (remote sidecar / mock)
//! └──────────┬───────────┘        └─────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐        ┌─────────────────────┐
//! │ ChallengeStore       │        │                     │
//! │ CredentialRegistry   │──────▶ │ SharedStore         │  (Redis / mock)
//! │ TokenIssuer          │        │                     │
//! │ RateLimiter          │        └─────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! This enables:
//! - **Testing**: Use mocks (in-memory, deterministic)
//! - **Production**: Use real services (Redis, verification sidecar)

pub mod remote_verifier;
pub mod shared_store;
pub mod webauthn;

pub use remote_verifier::RemoteWebAuthnVerifier;
pub use shared_store::SharedStore;
pub use webauthn::{
    AssertionPayload, AttestationPayload, AuthenticationResponse, ClientData, ExpectedCeremony,
    RegistrationResponse, VerifiedAuthentication, VerifiedRegistration, WebAuthnVerifier,
};
