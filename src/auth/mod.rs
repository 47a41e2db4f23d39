//! Authentication domain: tokens, passwords, two-factor, the external
//! identity provider boundary, and shared auth state.

pub mod error;
pub mod password;
pub mod provider;
pub mod state;
pub mod token;
pub mod twofactor;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
