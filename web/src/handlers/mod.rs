//! HTTP request handlers.
//!
//! Handlers only translate between HTTP and [`PasskeyOrchestrator`](passkey_auth::PasskeyOrchestrator)
//! calls; they hold no business logic.

pub mod auth;
pub mod health;
pub mod well_known;

pub use health::health_check;
