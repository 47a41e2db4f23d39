//! Postgres-backed credential store.
//!
//! Every mutation that must not double-apply (reset-token consumption,
//! backup-code removal) is a single conditional `UPDATE`, so concurrent
//! requests race on the database row, not on read-then-write logic.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    AccountStatus, CreateOutcome, CredentialStore, NewProfile, Profile, ProfileUpdate, Role,
};

const PROFILE_COLUMNS: &str = "id, email, full_name, role, status, password_hash, \
     reset_token_hash, reset_token_expires, two_factor_secret, \
     two_factor_backup_codes, two_factor_enabled, created_at, updated_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn profile_from_row(row: &PgRow) -> Result<Profile> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(Profile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown role in store: {role}"))?,
        status: AccountStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown status in store: {status}"))?,
        password_hash: row.get("password_hash"),
        reset_token_hash: row.get("reset_token_hash"),
        reset_token_expires: row.get("reset_token_expires"),
        two_factor_secret: row.get("two_factor_secret"),
        two_factor_backup_codes: row.get("two_factor_backup_codes"),
        two_factor_enabled: row.get("two_factor_enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to load profile by id")?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to load profile by email")?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Profile>> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list profiles")?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn create(&self, new: NewProfile) -> Result<CreateOutcome> {
        let query = format!(
            "INSERT INTO profiles (email, full_name, role, status, password_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&new.email)
            .bind(&new.full_name)
            .bind(new.role.as_str())
            .bind(new.status.as_str())
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(profile_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert profile"),
        }
    }

    async fn update(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<Profile>> {
        if update.is_empty() {
            return self.find_by_id(id).await;
        }
        let query = format!(
            "UPDATE profiles SET \
                 full_name = COALESCE($2, full_name), \
                 role = COALESCE($3, role), \
                 status = COALESCE($4, status), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.full_name.as_deref())
            .bind(update.role.map(Role::as_str))
            .bind(update.status.map(AccountStatus::as_str))
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to update profile")?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM profiles WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete profile")?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<Option<Profile>> {
        // Clearing the reset token in the same statement keeps an
        // admin-issued password change from leaving a live reset link.
        let query = format!(
            "UPDATE profiles SET \
                 password_hash = $2, \
                 reset_token_hash = NULL, \
                 reset_token_expires = NULL, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to store password hash")?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        let query = "UPDATE profiles SET \
                 reset_token_hash = $2, \
                 reset_token_expires = $3, \
                 updated_at = now() \
             WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(expires)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to store reset token")?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Profile>> {
        // The WHERE clause carries both the match and the expiry check, so a
        // second consumer (or a late one) simply matches zero rows.
        let query = format!(
            "UPDATE profiles SET \
                 password_hash = $2, \
                 reset_token_hash = NULL, \
                 reset_token_expires = NULL, \
                 updated_at = now() \
             WHERE reset_token_hash = $1 AND reset_token_expires > $3 \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(new_password_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to consume reset token")?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn store_two_factor_secret(
        &self,
        id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> Result<()> {
        let query = "UPDATE profiles SET \
                 two_factor_secret = $2, \
                 two_factor_backup_codes = $3, \
                 updated_at = now() \
             WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(secret)
            .bind(backup_code_hashes)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to store two-factor secret")?;
        Ok(())
    }

    async fn set_two_factor_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let query = "UPDATE profiles SET two_factor_enabled = $2, updated_at = now() \
             WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to set two-factor flag")?;
        Ok(())
    }

    async fn clear_two_factor(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE profiles SET \
                 two_factor_enabled = FALSE, \
                 two_factor_secret = NULL, \
                 two_factor_backup_codes = '{}', \
                 updated_at = now() \
             WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to clear two-factor material")?;
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        // array_remove with the `= ANY` guard is the compare-and-remove:
        // among racing consumers exactly one UPDATE matches.
        let query = "UPDATE profiles SET \
                 two_factor_backup_codes = array_remove(two_factor_backup_codes, $2), \
                 updated_at = now() \
             WHERE id = $1 AND $2 = ANY(two_factor_backup_codes)";
        let result = sqlx::query(query)
            .bind(id)
            .bind(code_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to consume backup code")?;
        Ok(result.rows_affected() == 1)
    }
}
