//! Time-based one-time codes and single-use backup codes.
//!
//! A profile's two-factor state moves `unset` -> secret generated (pending
//! verification) -> `enabled` once the caller proves possession of a valid
//! code. Disabling is reachable for admin-role profiles only; for everyone
//! else two-factor is mandatory and the refusal happens here on the server,
//! not in any UI layer.
//!
//! Backup codes are returned in plaintext exactly once at enrollment and
//! stored as salted Argon2id hashes. Consumption goes through the store's
//! compare-and-remove so two racing verifications cannot both spend the
//! same code.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::auth::error::AuthError;
use crate::store::{CredentialStore, Profile, Role};

const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_BYTES: usize = 4; // 8 hex characters
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
// +/-2 steps tolerates roughly a minute of client clock drift.
const TOTP_SKEW_STEPS: u8 = 2;

/// Plaintext enrollment material, handed to the caller exactly once.
#[derive(Debug)]
pub struct Enrollment {
    pub secret_base32: String,
    pub qr_data_url: String,
    pub backup_codes: Vec<String>,
}

/// Two-factor state as reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoFactorState {
    Unset,
    PendingVerification,
    Enabled,
}

impl TwoFactorState {
    #[must_use]
    pub fn of(profile: &Profile) -> Self {
        if profile.two_factor_enabled {
            Self::Enabled
        } else if profile.two_factor_secret.is_some() {
            Self::PendingVerification
        } else {
            Self::Unset
        }
    }
}

#[derive(Clone)]
pub struct TwoFactorService {
    store: Arc<dyn CredentialStore>,
    issuer: String,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, issuer: String) -> Self {
        Self { store, issuer }
    }

    /// Generate a fresh secret and backup codes for the profile, replacing
    /// any previous material. The profile stays in pending-verification
    /// until a first code is confirmed.
    ///
    /// # Errors
    /// Returns an error if secret generation, QR rendering, hashing, or the
    /// store write fails.
    pub async fn generate_secret(&self, profile: &Profile) -> Result<Enrollment> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|err| anyhow!("secret generation failed: {err:?}"))?;

        let totp = self.build_totp(secret_bytes, &profile.email)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("QR generation failed: {err}"))?;
        let qr_data_url = format!("data:image/png;base64,{qr}");
        let secret_base32 = totp.get_secret_base32();

        let mut backup_codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_backup_code()?;
            code_hashes.push(hash_backup_code(&code)?);
            backup_codes.push(code);
        }

        self.store
            .store_two_factor_secret(profile.id, &secret_base32, &code_hashes)
            .await?;

        Ok(Enrollment {
            secret_base32,
            qr_data_url,
            backup_codes,
        })
    }

    /// Verify a submitted code: backup codes first (consumed on match),
    /// then the time-based code within the skew window. The TOTP path
    /// consumes nothing.
    ///
    /// # Errors
    /// Returns an error if no secret is set up or the store fails.
    pub async fn verify_code(&self, profile: &Profile, code: &str) -> Result<bool> {
        let Some(secret_base32) = profile.two_factor_secret.as_deref() else {
            return Err(anyhow!("two-factor not set up for this profile"));
        };

        let normalized = code.trim().to_uppercase();
        for stored_hash in &profile.two_factor_backup_codes {
            if backup_code_matches(&normalized, stored_hash) {
                // Compare-and-remove: exactly one of several racing
                // consumers sees `true` here.
                return self
                    .store
                    .consume_backup_code(profile.id, stored_hash)
                    .await;
            }
        }

        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|err| anyhow!("stored secret is not valid base32: {err:?}"))?;
        let totp = self.build_totp(secret_bytes, &profile.email)?;
        totp.check_current(normalized.trim())
            .context("system clock error during TOTP check")
    }

    /// Mark two-factor active after the caller proves possession of a valid
    /// code.
    ///
    /// # Errors
    /// Returns an error if the store write fails.
    pub async fn enable(&self, profile: &Profile) -> Result<()> {
        if profile.two_factor_secret.is_none() {
            return Err(anyhow!("cannot enable two-factor before setup"));
        }
        self.store.set_two_factor_enabled(profile.id, true).await
    }

    /// Clear secret, backup codes, and the enabled flag. Refused for
    /// non-admin profiles: two-factor is mandatory for them.
    ///
    /// # Errors
    /// `AuthError::PolicyViolation` for non-admin profiles; otherwise store
    /// failures.
    pub async fn disable(&self, profile: &Profile) -> Result<(), AuthError> {
        if profile.role != Role::Admin {
            return Err(AuthError::PolicyViolation(
                "Two-factor authentication is mandatory for this account and cannot be disabled"
                    .to_string(),
            ));
        }
        self.store
            .clear_two_factor(profile.id)
            .await
            .map_err(AuthError::Internal)
    }

    fn build_totp(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init error: {err}"))
    }
}

/// One backup code: 8 uppercase hex characters.
fn generate_backup_code() -> Result<String> {
    let mut bytes = [0u8; BACKUP_CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate backup code")?;
    Ok(bytes.iter().map(|byte| format!("{byte:02X}")).collect())
}

fn hash_backup_code(code: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(code.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| anyhow!("failed to hash backup code"))
}

fn backup_code_matches(normalized_code: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(normalized_code.as_bytes(), &parsed)
            .is_ok()
    })
}
