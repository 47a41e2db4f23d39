//! Password reset and change flows.

use axum::{extract::Extension, http::HeaderMap, Json};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::error;

use crate::api::email;
use crate::auth::error::{invalid_credentials, AuthError};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::state::AuthState;
use crate::auth::token::{generate_reset_token, hash_reset_token};
use crate::store::normalize_email;

use super::resolver;
use super::types::{
    MessageResponse, RequestPasswordResetRequest, ResetPasswordRequest, UpdatePasswordRequest,
};

const MIN_PASSWORD_LENGTH: usize = 8;

fn check_password_strength(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/request-password-reset",
    request_body = RequestPasswordResetRequest,
    responses(
        (status = 200, description = "Always succeeds, whether or not the email exists", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<RequestPasswordResetRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = normalize_email(&request.email);

    // The response never varies with account existence; delivery failures
    // are logged, not surfaced, for the same reason.
    if let Some(profile) = state
        .store()
        .find_by_email(&email)
        .await
        .map_err(AuthError::Internal)?
    {
        let token = generate_reset_token().map_err(AuthError::Internal)?;
        let expires = Utc::now() + Duration::seconds(state.config().reset_token_ttl_seconds());
        state
            .store()
            .set_reset_token(profile.id, &hash_reset_token(&token), expires)
            .await
            .map_err(AuthError::Internal)?;

        let message = email::reset_message(state.config().frontend_base_url(), &email, &token);
        if let Err(err) = state.email().send(&message) {
            error!("failed to deliver reset email: {err:#}");
        }
    }

    Ok(Json(MessageResponse {
        message: "If the email exists, a reset link has been sent".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated, token consumed", body = MessageResponse),
        (status = 400, description = "Unknown, consumed, or expired token"),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    check_password_strength(&request.password)?;

    let new_hash = hash_password(&request.password).map_err(AuthError::Internal)?;
    // Hash the new password and null the token in one conditional write; a
    // second consumer of the same token matches nothing and fails closed.
    let updated = state
        .store()
        .consume_reset_token(&hash_reset_token(&request.token), &new_hash, Utc::now())
        .await
        .map_err(AuthError::Internal)?;

    match updated {
        Some(_) => Ok(Json(MessageResponse {
            message: "Password updated".to_string(),
        })),
        None => Err(AuthError::InvalidOrExpiredToken),
    }
}

#[utoipa::path(
    post,
    path = "/auth/update-password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Missing token or wrong current password"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn update_password(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    check_password_strength(&request.new_password)?;

    // Proof of the current password is required even with a valid token.
    let Some(current_hash) = principal.profile.password_hash.as_deref() else {
        return Err(invalid_credentials());
    };
    if !verify_password(&request.current_password, current_hash) {
        return Err(AuthError::InvalidCredentials(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&request.new_password).map_err(AuthError::Internal)?;
    state
        .store()
        .set_password_hash(principal.profile.id, &new_hash)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::Unauthorized)?;

    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}
