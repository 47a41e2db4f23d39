//! Request identity resolution.
//!
//! Two credential formats arrive on the same `Authorization: Bearer` header:
//! our own signed tokens and the external identity provider's tokens. The
//! resolver runs an ordered verifier chain; each verifier answers
//! `Matched`, `NotApplicable`, or `Failed`, and the chain stops at the
//! first match. Only when every verifier declines does the caller get a
//! generic 401, so a probe can never learn which path was attempted.
//!
//! A matched self-issued token is never trusted for role/status: the profile
//! is re-loaded by id so authorization decisions always see current state.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::error;

use crate::auth::error::AuthError;
use crate::auth::provider::ProviderVerdict;
use crate::auth::state::AuthState;
use crate::auth::token::TokenService;
use crate::store::{
    normalize_email, AccountStatus, CreateOutcome, NewProfile, Profile, Role,
};

/// Caller identity attached to a request after resolution.
#[derive(Clone, Debug)]
pub struct Principal {
    pub profile: Profile,
    /// Config-level allow-list membership, distinct from the stored role.
    pub super_admin: bool,
}

impl Principal {
    /// Gate: role must be admin.
    ///
    /// # Errors
    /// `AuthError::Forbidden` otherwise.
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.profile.role == Role::Admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Admin access required"))
        }
    }

    /// Gate: account status must be approved.
    ///
    /// # Errors
    /// `AuthError::Forbidden` otherwise.
    pub fn require_approved(&self) -> Result<(), AuthError> {
        if self.profile.status == AccountStatus::Approved {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Approved account required"))
        }
    }

    /// Gate: email must be on the configured super-admin allow-list.
    ///
    /// # Errors
    /// `AuthError::Forbidden` otherwise.
    pub fn require_super_admin(&self) -> Result<(), AuthError> {
        if self.super_admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Super admin access required"))
        }
    }
}

enum VerifierOutcome {
    Matched(Profile),
    NotApplicable,
    Failed,
}

/// Resolve the caller behind an `Authorization: Bearer` header.
///
/// # Errors
/// `AuthError::Unauthorized` (uniform message) when no verifier matches.
pub async fn resolve(headers: &HeaderMap, state: &AuthState) -> Result<Principal, AuthError> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthError::Unauthorized);
    };

    // Ordered chain, first match wins; later verifiers only run when the
    // earlier ones decline.
    if let VerifierOutcome::Matched(profile) = verify_self_issued(&token, state).await? {
        return Ok(principal_for(profile, state));
    }
    if let VerifierOutcome::Matched(profile) = verify_provider(&token, state).await? {
        return Ok(principal_for(profile, state));
    }

    Err(AuthError::Unauthorized)
}

fn principal_for(profile: Profile, state: &AuthState) -> Principal {
    let super_admin = state.config().is_super_admin(&profile.email);
    Principal {
        profile,
        super_admin,
    }
}

/// Self-issued path: verify signature/expiry, then re-load the profile so
/// role/status are current at request time rather than echoed from the
/// token.
async fn verify_self_issued(
    token: &str,
    state: &AuthState,
) -> Result<VerifierOutcome, AuthError> {
    if !TokenService::looks_self_issued(token) {
        return Ok(VerifierOutcome::NotApplicable);
    }
    let Ok(claims) = state.tokens().verify(token) else {
        return Ok(VerifierOutcome::Failed);
    };
    match state.store().find_by_id(claims.sub).await {
        Ok(Some(profile)) => Ok(VerifierOutcome::Matched(profile)),
        Ok(None) => Ok(VerifierOutcome::Failed),
        Err(err) => Err(AuthError::Internal(err)),
    }
}

/// Provider fallback: ask the identity provider, then resolve-or-create the
/// local profile for that external identity. A provider outage is logged
/// and treated as a failed verification, never as a panic or a 500.
async fn verify_provider(token: &str, state: &AuthState) -> Result<VerifierOutcome, AuthError> {
    let verdict = match state.provider().validate_token(token).await {
        Ok(verdict) => verdict,
        Err(err) => {
            error!("identity provider unavailable: {err:#}");
            return Ok(VerifierOutcome::Failed);
        }
    };
    let identity = match verdict {
        ProviderVerdict::Valid(identity) => identity,
        ProviderVerdict::Rejected => return Ok(VerifierOutcome::Failed),
    };

    let email = normalize_email(&identity.email);
    if let Some(profile) = state
        .store()
        .find_by_email(&email)
        .await
        .map_err(AuthError::Internal)?
    {
        return Ok(VerifierOutcome::Matched(profile));
    }

    // First sight of this external identity: auto-provision a pending user.
    let new = NewProfile::provisioned(email.clone(), identity.full_name);
    match state.store().create(new).await.map_err(AuthError::Internal)? {
        CreateOutcome::Created(profile) => Ok(VerifierOutcome::Matched(profile)),
        // Lost a provisioning race; the other writer's record wins.
        CreateOutcome::Conflict => match state
            .store()
            .find_by_email(&email)
            .await
            .map_err(AuthError::Internal)?
        {
            Some(profile) => Ok(VerifierOutcome::Matched(profile)),
            None => Ok(VerifierOutcome::Failed),
        },
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use axum::http::HeaderValue;
    use crate::store::{CredentialStore, ProfileUpdate};

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn self_issued_token_resolves_with_fresh_role_and_status() {
        let ctx = testing::TestContext::new();
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();

        // Promote after issuance; the resolver must see the new role.
        ctx.store
            .update(
                profile.id,
                ProfileUpdate {
                    role: Some(Role::Admin),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();

        let principal = resolve(&bearer(&token), &ctx.state).await.unwrap();
        assert_eq!(principal.profile.id, profile.id);
        assert_eq!(principal.profile.role, Role::Admin);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let ctx = testing::TestContext::with_token_ttl(-60);
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();

        let err = resolve(&bearer(&token), &ctx.state).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn deleted_profile_behind_valid_token_is_unauthorized() {
        let ctx = testing::TestContext::new();
        let profile = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&profile).unwrap();
        ctx.store.delete(profile.id).await.unwrap();

        let err = resolve(&bearer(&token), &ctx.state).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn provider_token_provisions_pending_profile() {
        let ctx = testing::TestContext::new().with_provider_identity(
            "sb-provider-token",
            "New.Person@Example.com",
            Some("New Person"),
        );

        let principal = resolve(&bearer("sb-provider-token"), &ctx.state)
            .await
            .unwrap();
        assert_eq!(principal.profile.email, "new.person@example.com");
        assert_eq!(principal.profile.full_name, "New Person");
        assert_eq!(principal.profile.role, Role::User);
        assert_eq!(principal.profile.status, AccountStatus::Pending);

        // Second resolution reuses the provisioned record.
        let again = resolve(&bearer("sb-provider-token"), &ctx.state)
            .await
            .unwrap();
        assert_eq!(again.profile.id, principal.profile.id);
    }

    #[tokio::test]
    async fn unknown_tokens_and_missing_headers_are_uniform_401() {
        let ctx = testing::TestContext::new();

        let err = resolve(&bearer("sb-unknown-token"), &ctx.state)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");

        let err = resolve(&HeaderMap::new(), &ctx.state).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        let err = resolve(&headers, &ctx.state).await.unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[tokio::test]
    async fn provider_outage_is_unauthorized_not_500() {
        let ctx = testing::TestContext::new().with_failing_provider();
        let err = resolve(&bearer("sb-any-token"), &ctx.state)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn gates_enforce_role_status_and_allow_list() {
        let ctx = testing::TestContext::with_super_admins("root@parkwise.app");
        let user = ctx
            .seed("officer@parkwise.app", Role::User, AccountStatus::Pending)
            .await;
        let token = ctx.state.tokens().issue(&user).unwrap();
        let principal = resolve(&bearer(&token), &ctx.state).await.unwrap();

        assert!(principal.require_admin().is_err());
        assert!(principal.require_approved().is_err());
        assert!(principal.require_super_admin().is_err());

        let root = ctx
            .seed("root@parkwise.app", Role::Admin, AccountStatus::Approved)
            .await;
        let token = ctx.state.tokens().issue(&root).unwrap();
        let principal = resolve(&bearer(&token), &ctx.state).await.unwrap();
        assert!(principal.require_admin().is_ok());
        assert!(principal.require_approved().is_ok());
        assert!(principal.require_super_admin().is_ok());
    }
}
