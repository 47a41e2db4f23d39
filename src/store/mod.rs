//! Profile records and the credential store abstraction.
//!
//! The store persists everything the auth core needs to answer "who is this
//! caller": profile identity, role/status, password hash, outstanding reset
//! token, and two-factor material. Mutations that must not double-apply
//! (reset-token consumption, backup-code removal) are single conditional
//! operations in every implementation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Role stored on the profile. Super-admin is a config-level allow-list,
/// not a role value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Account approval lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccountStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Full profile record as persisted. Secrets never leave the server; API
/// responses use the trimmed `UserView` DTO instead.
#[derive(Clone, Debug)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub password_hash: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub two_factor_secret: Option<String>,
    pub two_factor_backup_codes: Vec<String>,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a brand new profile. Email must already be normalized.
#[derive(Clone, Debug)]
pub struct NewProfile {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub password_hash: Option<String>,
}

impl NewProfile {
    /// Auto-provisioned profile for a first-seen external identity.
    #[must_use]
    pub fn provisioned(email: String, full_name: Option<String>) -> Self {
        // Fall back to the email local-part when the provider has no name.
        let full_name = full_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                email
                    .split('@')
                    .next()
                    .unwrap_or(email.as_str())
                    .to_string()
            });
        Self {
            email,
            full_name,
            role: Role::User,
            status: AccountStatus::Pending,
            password_hash: None,
        }
    }
}

/// Partial update applied by self-service or admin endpoints.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.role.is_none() && self.status.is_none()
    }
}

/// Outcome when inserting a new profile.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Profile),
    /// A profile with the same email already exists.
    Conflict,
}

/// Persistence boundary for the auth core.
///
/// All operations are atomic single-record reads/updates; no multi-row
/// transactions are required. `consume_reset_token` and
/// `consume_backup_code` are conditional writes so that two racing callers
/// cannot both succeed.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Lookup by normalized (lowercase) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>>;

    async fn list(&self) -> Result<Vec<Profile>>;

    async fn create(&self, new: NewProfile) -> Result<CreateOutcome>;

    /// Apply a partial update; returns the updated profile or `None` if the
    /// id is unknown.
    async fn update(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<Profile>>;

    /// Hard delete; returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Store a new password hash and clear any outstanding reset token in
    /// the same write.
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<Option<Profile>>;

    /// Record a pending reset token (stored as a digest) with its expiry.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<()>;

    /// Single-use consumption: if `token_hash` matches an unexpired reset
    /// token, store the new password hash and null out token + expiry in the
    /// same conditional write. Returns the updated profile, or `None` when
    /// the token is unknown, already consumed, or expired.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Profile>>;

    /// Persist a generated (not yet confirmed) two-factor secret together
    /// with the hashed backup codes, replacing any previous material.
    async fn store_two_factor_secret(
        &self,
        id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> Result<()>;

    /// Flip the enabled flag once setup is confirmed.
    async fn set_two_factor_enabled(&self, id: Uuid, enabled: bool) -> Result<()>;

    /// Remove secret, backup codes, and the enabled flag in one write.
    async fn clear_two_factor(&self, id: Uuid) -> Result<()>;

    /// Compare-and-remove of a stored backup-code hash. Returns `true` for
    /// exactly one caller when several race on the same code.
    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
