//! Backend boundary used by the session controller.
//!
//! The trait exists so the controller can be driven by scripted doubles in
//! tests; `HttpAuthApi` is the real client. Error classification lives here:
//! a 401/403 means the credential itself is bad, anything transport-shaped
//! (timeout, connect failure, 5xx) is transient and must never be treated as
//! a sign-out signal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::store::{AccountStatus, Role};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Profile as seen by the client.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub two_factor_enabled: bool,
}

/// Outcome of a credential sign-in.
#[derive(Clone, Debug)]
pub enum SignInOutcome {
    Complete { profile: AccountProfile, token: String },
    SecondFactorRequired { user_id: Uuid },
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    /// The credential was rejected (401/403). The session is over.
    #[error("authentication failed ({status})")]
    Auth { status: u16 },

    /// The server understood the request and said no (other 4xx). The
    /// session, if any, is still intact.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Timeout, connection failure, or 5xx. Retryable; never a sign-out.
    #[error("{message}")]
    Transient { message: String },
}

impl ApiError {
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Calls the session controller needs from the outside world.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, ApiError>;

    async fn verify_two_factor(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<(AccountProfile, String), ApiError>;

    /// Canonical profile refresh against the held bearer token.
    async fn fetch_me(&self, token: &str) -> Result<AccountProfile, ApiError>;

    /// Best-effort provider-side sign-out, used when abandoning a pending
    /// second-factor challenge or signing out.
    async fn sign_out_provider(&self) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    requires_two_factor: bool,
    user_id: Option<Uuid>,
    user: Option<AccountProfile>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    user: AccountProfile,
    token: String,
}

#[derive(Debug, Deserialize)]
struct MePayload {
    user: AccountProfile,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP implementation talking to the auth backend.
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
    provider_logout_url: Option<String>,
}

impl HttpAuthApi {
    /// # Errors
    /// Returns a `Transient` error if the HTTP client cannot be built.
    pub fn new(base_url: &str, provider_logout_url: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ApiError::Transient {
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_logout_url,
        })
    }

    async fn read_error(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let message = response
            .json::<ErrorPayload>()
            .await
            .map_or_else(|_| status.to_string(), |payload| payload.error.message);
        classify_status(status.as_u16(), message)
    }
}

fn classify_status(status: u16, message: String) -> ApiError {
    match status {
        401 | 403 => ApiError::Auth { status },
        400..=499 => ApiError::Rejected { status, message },
        _ => ApiError::Transient { message },
    }
}

fn classify_transport(err: &reqwest::Error) -> ApiError {
    ApiError::Transient {
        message: err.to_string(),
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let payload: LoginPayload = response
            .json()
            .await
            .map_err(|err| classify_transport(&err))?;

        if payload.requires_two_factor {
            let user_id = payload.user_id.ok_or_else(|| ApiError::Transient {
                message: "malformed login response: missing user_id".to_string(),
            })?;
            return Ok(SignInOutcome::SecondFactorRequired { user_id });
        }

        match (payload.user, payload.token) {
            (Some(profile), Some(token)) => Ok(SignInOutcome::Complete { profile, token }),
            _ => Err(ApiError::Transient {
                message: "malformed login response: missing user or token".to_string(),
            }),
        }
    }

    async fn verify_two_factor(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<(AccountProfile, String), ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/verify-2fa-login", self.base_url))
            .json(&json!({ "user_id": user_id, "code": code }))
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let payload: VerifyPayload = response
            .json()
            .await
            .map_err(|err| classify_transport(&err))?;
        Ok((payload.user, payload.token))
    }

    async fn fetch_me(&self, token: &str) -> Result<AccountProfile, ApiError> {
        let response = self
            .client
            .get(format!("{}/auth/me", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let payload: MePayload = response
            .json()
            .await
            .map_err(|err| classify_transport(&err))?;
        Ok(payload.user)
    }

    async fn sign_out_provider(&self) -> Result<(), ApiError> {
        let Some(url) = &self.provider_logout_url else {
            return Ok(());
        };
        self.client
            .post(url)
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;
        Ok(())
    }
}
