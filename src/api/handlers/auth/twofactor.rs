//! Two-factor enrollment management for the signed-in user.
//!
//! Login-time verification lives in `login::verify_two_factor_login`; the
//! endpoints here cover setup (generate, confirm) and teardown.

use axum::{extract::Extension, http::HeaderMap, Json};
use std::sync::Arc;
use tracing::info;

use crate::auth::error::AuthError;
use crate::auth::state::AuthState;
use crate::auth::twofactor::TwoFactorState;

use super::resolver;
use super::types::{
    GenerateTwoFactorResponse, TwoFactorEnabledResponse, TwoFactorStatusResponse,
    VerifyTwoFactorSetupRequest,
};

#[utoipa::path(
    get,
    path = "/auth/2fa/status",
    responses(
        (status = 200, description = "Current enrollment state", body = TwoFactorStatusResponse),
        (status = 401, description = "Missing or unverifiable token"),
    ),
    security(("bearer" = [])),
    tag = "two-factor"
)]
pub async fn status(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<Json<TwoFactorStatusResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    let enrollment = TwoFactorState::of(&principal.profile);
    Ok(Json(TwoFactorStatusResponse {
        enabled: enrollment == TwoFactorState::Enabled,
        pending: enrollment == TwoFactorState::PendingVerification,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/2fa/generate",
    responses(
        (status = 200, description = "Fresh secret, QR data URL, and plaintext backup codes", body = GenerateTwoFactorResponse),
        (status = 401, description = "Missing or unverifiable token"),
        (status = 403, description = "Account not approved"),
    ),
    security(("bearer" = [])),
    tag = "two-factor"
)]
pub async fn generate(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<Json<GenerateTwoFactorResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;

    // Regenerating replaces any earlier pending secret; the backup codes are
    // shown in plaintext here and never again.
    let enrollment = state
        .two_factor()
        .generate_secret(&principal.profile)
        .await
        .map_err(AuthError::Internal)?;

    Ok(Json(GenerateTwoFactorResponse {
        secret: enrollment.secret_base32,
        qr_code_url: enrollment.qr_data_url,
        backup_codes: enrollment.backup_codes,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/2fa/verify-setup",
    request_body = VerifyTwoFactorSetupRequest,
    responses(
        (status = 200, description = "Two-factor is now active", body = TwoFactorEnabledResponse),
        (status = 400, description = "No pending secret or wrong code"),
        (status = 401, description = "Missing or unverifiable token"),
    ),
    security(("bearer" = [])),
    tag = "two-factor"
)]
pub async fn verify_setup(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<VerifyTwoFactorSetupRequest>,
) -> Result<Json<TwoFactorEnabledResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;

    if principal.profile.two_factor_secret.is_none() {
        return Err(AuthError::BadRequest(
            "Two-factor setup has not been started".to_string(),
        ));
    }

    let verified = state
        .two_factor()
        .verify_code(&principal.profile, &request.code)
        .await
        .map_err(AuthError::Internal)?;
    if !verified {
        return Err(AuthError::BadRequest("Invalid two-factor code".to_string()));
    }

    state
        .two_factor()
        .enable(&principal.profile)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %principal.profile.id, "two-factor enabled");
    Ok(Json(TwoFactorEnabledResponse { enabled: true }))
}

#[utoipa::path(
    post,
    path = "/auth/2fa/disable",
    responses(
        (status = 200, description = "Two-factor cleared", body = TwoFactorEnabledResponse),
        (status = 401, description = "Missing or unverifiable token"),
        (status = 403, description = "Two-factor is mandatory for this account"),
    ),
    security(("bearer" = [])),
    tag = "two-factor"
)]
pub async fn disable(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<Json<TwoFactorEnabledResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;

    state.two_factor().disable(&principal.profile).await?;

    info!(user_id = %principal.profile.id, "two-factor disabled");
    Ok(Json(TwoFactorEnabledResponse { enabled: false }))
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::*;
    use crate::store::{AccountStatus, Role};
    use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
    use totp_rs::{Algorithm, Secret, TOTP};

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn current_code(secret_base32: &str) -> String {
        let secret = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 2, 30, secret, None, "test".to_string())
            .unwrap()
            .generate_current()
            .unwrap()
    }

    #[tokio::test]
    async fn setup_flow_generates_verifies_and_enables() {
        let ctx = TestContext::new();
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();

        let before = status(bearer(&token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert!(!before.enabled && !before.pending);

        let enrollment = generate(bearer(&token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(enrollment.backup_codes.len(), 10);
        assert!(enrollment.qr_code_url.starts_with("data:image/png;base64,"));

        let mid = status(bearer(&token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert!(!mid.enabled && mid.pending);

        let code = current_code(&enrollment.secret);
        verify_setup(
            bearer(&token),
            Extension(ctx.state.clone()),
            Json(VerifyTwoFactorSetupRequest { code }),
        )
        .await
        .unwrap();

        let after = status(bearer(&token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert!(after.enabled && !after.pending);
    }

    #[tokio::test]
    async fn verify_setup_rejects_wrong_code() {
        let ctx = TestContext::new();
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();

        generate(bearer(&token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        let err = verify_setup(
            bearer(&token),
            Extension(ctx.state.clone()),
            Json(VerifyTwoFactorSetupRequest {
                code: "000000".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let stored = ctx.reload(profile.id).await;
        assert!(!stored.two_factor_enabled);
    }

    #[tokio::test]
    async fn verify_setup_without_generate_is_rejected() {
        let ctx = TestContext::new();
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();

        let err = verify_setup(
            bearer(&token),
            Extension(ctx.state.clone()),
            Json(VerifyTwoFactorSetupRequest {
                code: "123456".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disable_is_admin_only() {
        let ctx = TestContext::new();
        let user = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;

        let user_token = ctx.state.tokens().issue(&user).unwrap();
        let err = disable(bearer(&user_token), Extension(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let admin_token = ctx.state.tokens().issue(&admin).unwrap();
        let response = disable(bearer(&admin_token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert!(!response.enabled);
    }
}
