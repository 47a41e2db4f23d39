//! In-memory credential store for tests and local development, in the same
//! spirit as the log-only email sender: a real implementation of the trait
//! with no external dependency.
//!
//! A single mutex guards the map, so the conditional mutations are atomic by
//! construction.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{CreateOutcome, CredentialStore, NewProfile, Profile, ProfileUpdate};

#[derive(Default)]
pub struct MemoryCredentialStore {
    profiles: Mutex<HashMap<Uuid, Profile>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully formed profile, returning its id.
    pub fn insert(&self, profile: Profile) -> Uuid {
        let id = profile.id;
        self.profiles
            .lock()
            .expect("credential store mutex poisoned")
            .insert(id, profile);
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Profile>> {
        self.profiles
            .lock()
            .expect("credential store mutex poisoned")
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Profile>> {
        Ok(self
            .lock()
            .values()
            .find(|profile| profile.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.lock().values().cloned().collect();
        profiles.sort_by_key(|profile| profile.created_at);
        Ok(profiles)
    }

    async fn create(&self, new: NewProfile) -> Result<CreateOutcome> {
        let mut profiles = self.lock();
        if profiles.values().any(|profile| profile.email == new.email) {
            return Ok(CreateOutcome::Conflict);
        }
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            email: new.email,
            full_name: new.full_name,
            role: new.role,
            status: new.status,
            password_hash: new.password_hash,
            reset_token_hash: None,
            reset_token_expires: None,
            two_factor_secret: None,
            two_factor_backup_codes: Vec::new(),
            two_factor_enabled: false,
            created_at: now,
            updated_at: now,
        };
        profiles.insert(profile.id, profile.clone());
        Ok(CreateOutcome::Created(profile))
    }

    async fn update(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<Profile>> {
        let mut profiles = self.lock();
        let Some(profile) = profiles.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = update.full_name {
            profile.full_name = full_name;
        }
        if let Some(role) = update.role {
            profile.role = role;
        }
        if let Some(status) = update.status {
            profile.status = status;
        }
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock().remove(&id).is_some())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<Option<Profile>> {
        let mut profiles = self.lock();
        let Some(profile) = profiles.get_mut(&id) else {
            return Ok(None);
        };
        profile.password_hash = Some(password_hash.to_string());
        profile.reset_token_hash = None;
        profile.reset_token_expires = None;
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        let mut profiles = self.lock();
        if let Some(profile) = profiles.get_mut(&id) {
            profile.reset_token_hash = Some(token_hash.to_string());
            profile.reset_token_expires = Some(expires);
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Profile>> {
        let mut profiles = self.lock();
        let target = profiles.values_mut().find(|profile| {
            profile.reset_token_hash.as_deref() == Some(token_hash)
                && profile.reset_token_expires.is_some_and(|expiry| expiry > now)
        });
        let Some(profile) = target else {
            return Ok(None);
        };
        profile.password_hash = Some(new_password_hash.to_string());
        profile.reset_token_hash = None;
        profile.reset_token_expires = None;
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn store_two_factor_secret(
        &self,
        id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> Result<()> {
        let mut profiles = self.lock();
        if let Some(profile) = profiles.get_mut(&id) {
            profile.two_factor_secret = Some(secret.to_string());
            profile.two_factor_backup_codes = backup_code_hashes.to_vec();
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_two_factor_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        let mut profiles = self.lock();
        if let Some(profile) = profiles.get_mut(&id) {
            profile.two_factor_enabled = enabled;
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_two_factor(&self, id: Uuid) -> Result<()> {
        let mut profiles = self.lock();
        if let Some(profile) = profiles.get_mut(&id) {
            profile.two_factor_enabled = false;
            profile.two_factor_secret = None;
            profile.two_factor_backup_codes.clear();
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        let mut profiles = self.lock();
        let Some(profile) = profiles.get_mut(&id) else {
            return Ok(false);
        };
        let before = profile.two_factor_backup_codes.len();
        profile
            .two_factor_backup_codes
            .retain(|hash| hash != code_hash);
        let consumed = profile.two_factor_backup_codes.len() < before;
        if consumed {
            profile.updated_at = Utc::now();
        }
        Ok(consumed)
    }
}
