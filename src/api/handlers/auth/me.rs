//! Current-profile endpoints.

use axum::{extract::Extension, http::HeaderMap, Json};
use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::auth::state::AuthState;
use crate::store::ProfileUpdate;

use super::resolver;
use super::types::{UpdateMeRequest, UserResponse, UserView};

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile as currently stored", body = UserResponse),
        (status = 401, description = "Missing or unverifiable token"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<Json<UserResponse>, AuthError> {
    // The resolver re-reads the profile, so role and status reflect what the
    // store says now rather than what the token was minted with.
    let principal = resolver::resolve(&headers, &state).await?;
    Ok(Json(UserResponse {
        user: UserView::from(&principal.profile),
    }))
}

#[utoipa::path(
    patch,
    path = "/auth/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Empty display name"),
        (status = 401, description = "Missing or unverifiable token"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn update_me(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;

    let full_name = request
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::BadRequest("Display name cannot be empty".to_string()))?;

    let update = ProfileUpdate {
        full_name: Some(full_name),
        ..ProfileUpdate::default()
    };
    let updated = state
        .store()
        .update(principal.profile.id, update)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::Unauthorized)?;

    Ok(Json(UserResponse {
        user: UserView::from(&updated),
    }))
}
