//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests.

pub mod clock;
pub mod shared_store;
pub mod webauthn;

pub use clock::MockClock;
pub use shared_store::{MockSharedStore, StoreFailure};
pub use webauthn::{MockWebAuthnVerifier, authentication_response, registration_response};
