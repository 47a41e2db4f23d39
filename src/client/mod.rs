//! Headless client-side session management.
//!
//! `SessionController` drives sign-in, the second-factor challenge, profile
//! refresh, and sign-out against an `AuthApi` backend; `InactivityGuard`
//! ends idle sessions locally.

pub mod api;
pub mod inactivity;
pub mod session;

pub use api::{AccountProfile, ApiError, AuthApi, HttpAuthApi, SignInOutcome};
pub use inactivity::{InactivityGuard, DEFAULT_IDLE_TIMEOUT};
pub use session::{ProviderEvent, SessionController, SessionState};
