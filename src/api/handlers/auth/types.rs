//! Request/response types for the auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::{AccountStatus, Profile, Role};

/// Profile as exposed over the API. Password hashes, reset tokens, and
/// two-factor material never appear here.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Profile> for UserView {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            email: profile.email.clone(),
            full_name: profile.full_name.clone(),
            role: profile.role,
            status: profile.status,
            two_factor_enabled: profile.two_factor_enabled,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Either a completed login (`user` + `token`) or a pending second factor
/// (`requires_two_factor` + `user_id`); never both.
#[derive(Debug, Serialize, Deserialize, Default, ToSchema)]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_two_factor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl LoginResponse {
    #[must_use]
    pub fn complete(user: UserView, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn two_factor_required(user_id: Uuid) -> Self {
        Self {
            requires_two_factor: true,
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyTwoFactorLoginRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyTwoFactorLoginResponse {
    pub verified: bool,
    pub user: UserView,
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: UserView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserView>,
}

/// Self-service update: name only. Role/status changes on self go through
/// the admin endpoints (and are refused there for one's own record anyway).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateMeRequest {
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteUserRequest {
    pub email: String,
    pub full_name: Option<String>,
    #[serde(default = "default_invite_role")]
    pub role: Role,
    #[serde(default = "default_invite_status")]
    pub status: AccountStatus,
}

const fn default_invite_role() -> Role {
    Role::User
}

const fn default_invite_status() -> AccountStatus {
    AccountStatus::Pending
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdminResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
    pub pending: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerateTwoFactorResponse {
    pub secret: String,
    pub qr_code_url: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyTwoFactorSetupRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorEnabledResponse {
    pub enabled: bool,
}
