//! Admin user management: listing, moderation, invitations, removals.

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::email;
use crate::auth::error::AuthError;
use crate::auth::password::hash_password;
use crate::auth::state::AuthState;
use crate::auth::token::{generate_reset_token, hash_reset_token};
use crate::store::{normalize_email, CreateOutcome, NewProfile, ProfileUpdate};

use super::resolver;
use super::types::{
    AdminResetPasswordRequest, InviteUserRequest, MessageResponse, UpdateUserRequest, UserResponse,
    UserView, UsersResponse,
};

#[utoipa::path(
    get,
    path = "/auth/users",
    responses(
        (status = 200, description = "All profiles", body = UsersResponse),
        (status = 401, description = "Missing or unverifiable token"),
        (status = 403, description = "Caller is not an approved admin"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> Result<Json<UsersResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;
    principal.require_admin()?;

    let profiles = state.store().list().await.map_err(AuthError::Internal)?;
    Ok(Json(UsersResponse {
        users: profiles.iter().map(UserView::from).collect(),
    }))
}

#[utoipa::path(
    patch,
    path = "/auth/users/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Empty update or unknown profile"),
        (status = 403, description = "Caller is not an approved admin, or is editing their own role/status"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;
    principal.require_admin()?;

    // Admins cannot demote or suspend themselves; that path goes through
    // another admin.
    if principal.profile.id == id && (request.role.is_some() || request.status.is_some()) {
        return Err(AuthError::Forbidden("Cannot change your own role or status"));
    }

    let update = ProfileUpdate {
        full_name: request
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        role: request.role,
        status: request.status,
    };
    if update.is_empty() {
        return Err(AuthError::BadRequest("Nothing to update".to_string()));
    }

    let updated = state
        .store()
        .update(id, update)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::BadRequest("Unknown user".to_string()))?;

    info!(user_id = %id, "profile updated by admin");
    Ok(Json(UserResponse {
        user: UserView::from(&updated),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/users/{id}/reset-password",
    params(("id" = Uuid, Path, description = "Profile id")),
    request_body = AdminResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced, pending reset token cleared", body = MessageResponse),
        (status = 400, description = "Weak password or unknown profile"),
        (status = 403, description = "Caller is not an approved admin"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn admin_reset_password(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdminResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;
    principal.require_admin()?;

    if request.password.len() < 8 {
        return Err(AuthError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let hash = hash_password(&request.password).map_err(AuthError::Internal)?;
    // set_password_hash also voids any self-service reset token the user
    // requested earlier.
    state
        .store()
        .set_password_hash(id, &hash)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::BadRequest("Unknown user".to_string()))?;

    info!(user_id = %id, "password reset by admin");
    Ok(Json(MessageResponse {
        message: "Password reset".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/users/invite",
    request_body = InviteUserRequest,
    responses(
        (status = 200, description = "Invitation sent", body = UserResponse),
        (status = 403, description = "Caller is not on the super-admin allow list"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn invite_user(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<InviteUserRequest>,
) -> Result<Json<UserResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;
    principal.require_super_admin()?;

    let email_addr = normalize_email(&request.email);
    if !crate::api::handlers::valid_email(&email_addr) {
        return Err(AuthError::BadRequest("Invalid email address".to_string()));
    }

    let new = NewProfile {
        email: email_addr.clone(),
        full_name: request
            .full_name
            .clone()
            .unwrap_or_else(|| local_part(&email_addr)),
        role: request.role,
        status: request.status,
        password_hash: None,
    };

    // Inviting an existing profile re-applies role/status and re-sends the
    // link instead of failing, so a lost invitation can be repeated.
    let profile = match state
        .store()
        .create(new)
        .await
        .map_err(AuthError::Internal)?
    {
        CreateOutcome::Created(profile) => profile,
        CreateOutcome::Conflict => {
            let existing = state
                .store()
                .find_by_email(&email_addr)
                .await
                .map_err(AuthError::Internal)?
                .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("conflict without record")))?;
            state
                .store()
                .update(
                    existing.id,
                    ProfileUpdate {
                        full_name: None,
                        role: Some(request.role),
                        status: Some(request.status),
                    },
                )
                .await
                .map_err(AuthError::Internal)?
                .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("profile vanished mid-invite")))?
        }
    };

    let token = generate_reset_token().map_err(AuthError::Internal)?;
    let expires = Utc::now() + Duration::seconds(state.config().reset_token_ttl_seconds());
    state
        .store()
        .set_reset_token(profile.id, &hash_reset_token(&token), expires)
        .await
        .map_err(AuthError::Internal)?;

    let message = email::invite_message(state.config().frontend_base_url(), &profile.email, &token);
    if let Err(err) = state.email().send(&message) {
        error!("failed to deliver invitation email: {err:#}");
    }

    info!(user_id = %profile.id, email = %profile.email, "user invited");
    Ok(Json(UserResponse {
        user: UserView::from(&profile),
    }))
}

#[utoipa::path(
    delete,
    path = "/auth/users/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile removed", body = MessageResponse),
        (status = 400, description = "Unknown profile"),
        (status = 403, description = "Caller is not a super admin, or tried to delete themselves"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AuthError> {
    let principal = resolver::resolve(&headers, &state).await?;
    principal.require_approved()?;
    principal.require_super_admin()?;

    if principal.profile.id == id {
        return Err(AuthError::Forbidden("Cannot delete your own account"));
    }

    let removed = state
        .store()
        .delete(id)
        .await
        .map_err(AuthError::Internal)?;
    if !removed {
        return Err(AuthError::BadRequest("Unknown user".to_string()));
    }

    info!(user_id = %id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted".to_string(),
    }))
}

fn local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::*;
    use crate::store::{AccountStatus, CredentialStore, Role};
    use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn list_requires_approved_admin() {
        let ctx = TestContext::new();
        let user = ctx
            .seed("plain@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let pending_admin = ctx
            .seed("pend@parkwise.app", Role::Admin, AccountStatus::Pending)
            .await;
        let admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;

        let user_token = ctx.state.tokens().issue(&user).unwrap();
        let err = list_users(bearer(&user_token), Extension(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let pending_token = ctx.state.tokens().issue(&pending_admin).unwrap();
        let err = list_users(bearer(&pending_token), Extension(ctx.state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let admin_token = ctx.state.tokens().issue(&admin).unwrap();
        let response = list_users(bearer(&admin_token), Extension(ctx.state.clone()))
            .await
            .unwrap();
        assert_eq!(response.users.len(), 3);
    }

    #[tokio::test]
    async fn admin_approves_pending_account() {
        let ctx = TestContext::new();
        let admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let pending = ctx
            .seed("new@parkwise.app", Role::User, AccountStatus::Pending)
            .await;
        let token = ctx.state.tokens().issue(&admin).unwrap();

        let response = update_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(pending.id),
            Json(UpdateUserRequest {
                full_name: None,
                role: None,
                status: Some(AccountStatus::Approved),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.user.status, AccountStatus::Approved);
    }

    #[tokio::test]
    async fn admin_cannot_change_own_role() {
        let ctx = TestContext::new();
        let admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&admin).unwrap();

        let err = update_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(admin.id),
            Json(UpdateUserRequest {
                full_name: None,
                role: Some(Role::User),
                status: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        // Renaming self through the admin endpoint is still fine.
        let response = update_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(admin.id),
            Json(UpdateUserRequest {
                full_name: Some("Head Admin".to_string()),
                role: None,
                status: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.user.full_name, "Head Admin");
    }

    #[tokio::test]
    async fn admin_reset_clears_pending_token() {
        let ctx = TestContext::new();
        let admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let target = ctx
            .seed("user@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        ctx.store
            .set_reset_token(
                target.id,
                &hash_reset_token("pending"),
                Utc::now() + Duration::hours(1),
            )
            .await
            .unwrap();
        let token = ctx.state.tokens().issue(&admin).unwrap();

        admin_reset_password(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(target.id),
            Json(AdminResetPasswordRequest {
                password: "admin-set-pass".to_string(),
            }),
        )
        .await
        .unwrap();

        let stored = ctx.reload(target.id).await;
        assert!(stored.reset_token_hash.is_none());
        assert!(crate::auth::password::verify_password(
            "admin-set-pass",
            stored.password_hash.as_deref().unwrap()
        ));
    }

    #[tokio::test]
    async fn invite_requires_super_admin_and_sends_link() {
        let ctx = TestContext::with_super_admins("root@parkwise.app");
        let plain_admin = ctx
            .seed("admin@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let root = ctx
            .seed("root@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;

        let admin_token = ctx.state.tokens().issue(&plain_admin).unwrap();
        let err = invite_user(
            bearer(&admin_token),
            Extension(ctx.state.clone()),
            Json(InviteUserRequest {
                email: "invitee@parkwise.app".to_string(),
                full_name: None,
                role: Role::User,
                status: AccountStatus::Approved,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let root_token = ctx.state.tokens().issue(&root).unwrap();
        let response = invite_user(
            bearer(&root_token),
            Extension(ctx.state.clone()),
            Json(InviteUserRequest {
                email: "Invitee@Parkwise.app".to_string(),
                full_name: None,
                role: Role::User,
                status: AccountStatus::Approved,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.user.email, "invitee@parkwise.app");
        assert_eq!(response.user.full_name, "invitee");

        let sent = ctx.emails.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "invitation");
    }

    #[tokio::test]
    async fn invite_existing_profile_reissues_link() {
        let ctx = TestContext::with_super_admins("root@parkwise.app");
        let root = ctx
            .seed("root@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let existing = ctx
            .seed("known@parkwise.app", Role::User, AccountStatus::Pending)
            .await;
        let token = ctx.state.tokens().issue(&root).unwrap();

        let response = invite_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Json(InviteUserRequest {
                email: existing.email.clone(),
                full_name: None,
                role: Role::Admin,
                status: AccountStatus::Approved,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.user.id, existing.id);
        assert_eq!(response.user.role, Role::Admin);
        assert_eq!(response.user.status, AccountStatus::Approved);
        assert_eq!(ctx.emails.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_refuses_self() {
        let ctx = TestContext::with_super_admins("root@parkwise.app");
        let root = ctx
            .seed("root@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let victim = ctx
            .seed("user@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&root).unwrap();

        let err = delete_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(root.id),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        delete_user(
            bearer(&token),
            Extension(ctx.state.clone()),
            Path(victim.id),
        )
        .await
        .unwrap();
        assert!(ctx.store.find_by_id(victim.id).await.unwrap().is_none());
    }
}
