//! Auth configuration and the shared state handed to handlers.

use secrecy::SecretString;
use std::sync::Arc;

use crate::api::email::EmailSender;
use crate::auth::provider::IdentityProvider;
use crate::auth::token::{TokenService, DEFAULT_TOKEN_TTL_SECONDS};
use crate::auth::twofactor::TwoFactorService;
use crate::store::{normalize_email, CredentialStore};

const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_ISSUER: &str = "Park Wise";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_secret: SecretString,
    token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    super_admins: Vec<String>,
    issuer: String,
    frontend_base_url: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(token_secret: SecretString, frontend_base_url: String) -> Self {
        Self {
            token_secret,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            super_admins: Vec::new(),
            issuer: DEFAULT_ISSUER.to_string(),
            frontend_base_url,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    /// Comma-separated allow-list of super-admin emails. Empty means no
    /// super-admin endpoints are reachable.
    #[must_use]
    pub fn with_super_admins(mut self, allow_list: &str) -> Self {
        self.super_admins = allow_list
            .split(',')
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Config-level privilege distinct from the stored role.
    #[must_use]
    pub fn is_super_admin(&self, email: &str) -> bool {
        let normalized = normalize_email(email);
        self.super_admins.iter().any(|entry| *entry == normalized)
    }
}

/// Everything the auth handlers share, injected as one Extension.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    two_factor: TwoFactorService,
    provider: Arc<dyn IdentityProvider>,
    email: Arc<dyn EmailSender>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let tokens = TokenService::new(config.token_secret(), config.token_ttl_seconds());
        let two_factor = TwoFactorService::new(store.clone(), config.issuer().to_string());
        Self {
            config,
            store,
            tokens,
            two_factor,
            provider,
            email,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn two_factor(&self) -> &TwoFactorService {
        &self.two_factor
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    #[must_use]
    pub fn email(&self) -> &Arc<dyn EmailSender> {
        &self.email
    }
}
