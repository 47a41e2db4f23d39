//! Password login and the second-factor completion step.

use axum::{extract::Extension, Json};
use std::sync::Arc;

use crate::auth::error::{invalid_credentials, AuthError};
use crate::auth::password::verify_password;
use crate::auth::state::AuthState;
use crate::store::{normalize_email, AccountStatus, Profile, Role};

use super::types::{
    LoginRequest, LoginResponse, UserView, VerifyTwoFactorLoginRequest,
    VerifyTwoFactorLoginResponse,
};

/// Check email/password against the store. Never distinguishes "no such
/// email" from "wrong password"; the account status, by contrast, is named
/// in the message since it is not a guessing vector.
async fn authenticate(state: &AuthState, email: &str, password: &str) -> Result<Profile, AuthError> {
    let email = normalize_email(email);
    let profile = state
        .store()
        .find_by_email(&email)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(invalid_credentials)?;

    // Profiles without a hash authenticate through the provider path only.
    let Some(hash) = profile.password_hash.as_deref() else {
        return Err(invalid_credentials());
    };
    if !verify_password(password, hash) {
        return Err(invalid_credentials());
    }
    if profile.status != AccountStatus::Approved {
        return Err(AuthError::InvalidCredentials(format!(
            "Account is {}. Please contact an administrator.",
            profile.status.as_str()
        )));
    }
    Ok(profile)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login complete, or second factor required", body = LoginResponse),
        (status = 401, description = "Invalid credentials or unapproved account"),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let profile = authenticate(&state, &request.email, &request.password).await?;

    // Two-factor interposes for user-role profiles that enabled it; no
    // bearer token leaves the server before the challenge completes.
    if profile.role == Role::User && profile.two_factor_enabled {
        return Ok(Json(LoginResponse::two_factor_required(profile.id)));
    }

    let token = state.tokens().issue(&profile).map_err(AuthError::Internal)?;
    Ok(Json(LoginResponse::complete(UserView::from(&profile), token)))
}

#[utoipa::path(
    post,
    path = "/auth/verify-2fa-login",
    request_body = VerifyTwoFactorLoginRequest,
    responses(
        (status = 200, description = "Second factor verified, token issued", body = VerifyTwoFactorLoginResponse),
        (status = 401, description = "Invalid or expired challenge"),
    ),
    tag = "auth"
)]
pub async fn verify_two_factor_login(
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<VerifyTwoFactorLoginRequest>,
) -> Result<Json<VerifyTwoFactorLoginResponse>, AuthError> {
    let profile = state
        .store()
        .find_by_id(request.user_id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(invalid_credentials)?;

    if profile.status != AccountStatus::Approved || !profile.two_factor_enabled {
        return Err(invalid_credentials());
    }

    let verified = state
        .two_factor()
        .verify_code(&profile, &request.code)
        .await
        .map_err(AuthError::Internal)?;
    if !verified {
        return Err(AuthError::InvalidCredentials(
            "Invalid two-factor code".to_string(),
        ));
    }

    let token = state.tokens().issue(&profile).map_err(AuthError::Internal)?;
    Ok(Json(VerifyTwoFactorLoginResponse {
        verified: true,
        user: UserView::from(&profile),
        token,
    }))
}
