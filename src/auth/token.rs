//! Self-issued bearer tokens and opaque reset tokens.
//!
//! Bearer tokens are stateless HS256 JWTs embedding id/email/role/status
//! with a fixed lifetime (24 h by default). A token is honored until its
//! natural expiry even if the profile changes server-side; the resolver
//! re-loads role/status from the store on every request, so the staleness
//! window only covers the embedded claims. Reset tokens are 32 random
//! bytes, handed out once and stored only as a sha256 digest.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store::{AccountStatus, Profile, Role};

pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Claims embedded in a self-issued bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// Issues and verifies self-issued signed bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Sign a bearer token for the profile. No side effects beyond signing.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn issue(&self, profile: &Profile) -> Result<String> {
        let now = Utc::now();
        let claims = BearerClaims {
            sub: profile.id,
            email: profile.email.clone(),
            role: profile.role,
            status: profile.status,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).context("failed to sign bearer token")
    }

    /// Verify signature and expiry; never partially trusts a token.
    ///
    /// # Errors
    /// `TokenError::Expired` past the expiry instant, `TokenError::Invalid`
    /// for anything malformed or tampered with.
    pub fn verify(&self, token: &str) -> Result<BearerClaims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<BearerClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Whether the string even parses as one of our tokens (three dot-joined
    /// base64url segments). Used by the resolver to decide between the
    /// self-issued path and the provider fallback without leaking which one
    /// ran.
    #[must_use]
    pub fn looks_self_issued(token: &str) -> bool {
        token.split('.').count() == 3
    }
}

/// Generate an opaque reset token: 32 bytes (256 bits) of OS randomness,
/// URL-safe base64. The raw value is only ever sent to the user.
///
/// # Errors
/// Returns an error if the OS randomness source fails.
pub fn generate_reset_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest a reset token for storage; lookups compare digests only.
#[must_use]
pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
