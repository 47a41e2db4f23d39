//! Error taxonomy for the auth core and its single HTTP mapping.
//!
//! Every auth failure funnels through `AuthError` so that status codes stay
//! consistent: 401 for anything unverifiable, 403 for insufficient
//! role/status/allow-list membership and policy refusals, 400 for stale
//! reset tokens, 500 for infrastructure faults. Unauthorized responses never
//! reveal which verification path was attempted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Bad email/password or unapproved account. The message may name the
    /// account status (pending/rejected) but never distinguishes unknown
    /// email from wrong password.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Stale or unknown reset token.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Missing or unverifiable bearer token. Always the same message.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but insufficient role/status/allow-list membership.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Server-enforced policy refusal, e.g. a non-admin disabling mandatory
    /// two-factor. Safe to be specific; this is not a guessing surface.
    #[error("{0}")]
    PolicyViolation(String),

    /// Malformed or unacceptable request input.
    #[error("{0}")]
    BadRequest(String),

    /// Infrastructure failure (database, provider transport). Logged, never
    /// surfaced verbatim.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials(_) | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::PolicyViolation(_) => StatusCode::FORBIDDEN,
            Self::InvalidOrExpiredToken | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                error!("internal auth error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

/// Convenience constructor for the uniform credential failure.
#[must_use]
pub fn invalid_credentials() -> AuthError {
    AuthError::InvalidCredentials("Invalid email or password".to_string())
}
