//! Auth handlers and supporting modules.
//!
//! Request identity is resolved per request by `resolver` (self-issued
//! bearer token first, external identity provider second) and attached as a
//! `Principal`. Handlers call the composable gates (`require_admin`,
//! `require_approved`, `require_super_admin`) explicitly, in order, before
//! touching anything.
//!
//! All failure paths funnel through `crate::auth::AuthError`, so 401/403
//! mapping is uniform across endpoints.

pub(crate) mod login;
pub(crate) mod me;
pub(crate) mod password;
pub(crate) mod resolver;
pub(crate) mod twofactor;
pub(crate) mod types;
pub(crate) mod users;

pub use resolver::Principal;
