//! External identity provider boundary.
//!
//! The provider can independently authenticate a user and issue its own
//! opaque tokens. We only ever ask it one question: "whose token is this?".
//! Transport failures are reported as errors, distinct from a definitive
//! rejection, so the resolver can log them without treating the outage as a
//! caller with bad credentials.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity attributes returned by the provider for a valid token.
#[derive(Clone, Debug)]
pub struct ExternalIdentity {
    pub email: String,
    pub full_name: Option<String>,
}

/// Definitive answer from the provider about a token.
#[derive(Debug)]
pub enum ProviderVerdict {
    Valid(ExternalIdentity),
    Rejected,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Ask the provider to validate one of its own tokens.
    ///
    /// # Errors
    /// Returns an error only for transport/infrastructure failures; a token
    /// the provider refuses is `Ok(ProviderVerdict::Rejected)`.
    async fn validate_token(&self, token: &str) -> Result<ProviderVerdict>;
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    email: String,
    #[serde(default)]
    user_metadata: ProviderUserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderUserMetadata {
    full_name: Option<String>,
}

/// HTTP client against the managed identity provider's user-info endpoint.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .context("failed to build identity provider client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn validate_token(&self, token: &str) -> Result<ProviderVerdict> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .context("identity provider request failed")?;

        let status = response.status();
        if status.is_client_error() {
            return Ok(ProviderVerdict::Rejected);
        }
        if !status.is_success() {
            anyhow::bail!("identity provider returned {status}");
        }

        let user: ProviderUser = response
            .json()
            .await
            .context("identity provider returned malformed user payload")?;
        Ok(ProviderVerdict::Valid(ExternalIdentity {
            email: user.email,
            full_name: user.user_metadata.full_name,
        }))
    }
}
