//! Headless session state machine.
//!
//! Owns the bearer token, the last-known profile, and the pending
//! second-factor state. Three event sources feed it concurrently: direct
//! user actions, provider-pushed events, and the inactivity countdown. State
//! lives behind one async mutex so concurrent events serialize instead of
//! racing each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::api::{AccountProfile, ApiError, AuthApi, SignInOutcome};
use super::inactivity::{InactivityGuard, DEFAULT_IDLE_TIMEOUT};

/// How long any single backend call may run before it surfaces as a
/// transient error.
const CALL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    AwaitingSecondFactor {
        user_id: Uuid,
    },
    Authenticated {
        profile: AccountProfile,
        token: String,
    },
    /// Token and last-known profile retained after a transient failure; the
    /// next successful refetch promotes back to `Authenticated`.
    Degraded {
        profile: AccountProfile,
        token: String,
        last_error: String,
    },
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Authenticated { token, .. } | Self::Degraded { token, .. } => Some(token),
            _ => None,
        }
    }

    #[must_use]
    pub fn profile(&self) -> Option<&AccountProfile> {
        match self {
            Self::Authenticated { profile, .. } | Self::Degraded { profile, .. } => Some(profile),
            _ => None,
        }
    }
}

/// Events pushed by the external identity provider.
#[derive(Clone, Debug)]
pub enum ProviderEvent {
    /// Silent token refresh. Updates the held token; only refetches the
    /// profile when the session is degraded and no fetch is in flight.
    TokenRefreshed { token: String },
    /// Provider-side revoke. Hard sign-out from any state.
    SessionEnded,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    state: Mutex<SessionState>,
    guard: Mutex<Option<InactivityGuard>>,
    idle_timeout: Duration,
    fetch_in_flight: AtomicBool,
}

impl Inner {
    async fn force_anonymous(&self) {
        let mut state = self.state.lock().await;
        *state = SessionState::Anonymous;
        drop(state);
        *self.guard.lock().await = None;
    }
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        Self::with_idle_timeout(api, DEFAULT_IDLE_TIMEOUT)
    }

    #[must_use]
    pub fn with_idle_timeout(api: Arc<dyn AuthApi>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(SessionState::Anonymous),
                guard: Mutex::new(None),
                idle_timeout,
                fetch_in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> SessionState {
        self.inner.state.lock().await.clone()
    }

    /// Record user interaction, restarting the idle countdown.
    pub async fn touch(&self) {
        if let Some(guard) = self.inner.guard.lock().await.as_ref() {
            guard.touch();
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    /// Propagates the backend error; the state is `Anonymous` again on
    /// failure, `AwaitingSecondFactor` or `Authenticated` on success.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), ApiError> {
        {
            let mut state = self.inner.state.lock().await;
            if matches!(*state, SessionState::Authenticating) {
                // A sign-in is already running; drop the duplicate event.
                return Ok(());
            }
            *state = SessionState::Authenticating;
        }

        let outcome = with_timeout(self.inner.api.sign_in(email, password)).await;

        match outcome {
            Ok(SignInOutcome::Complete { profile, token }) => {
                self.enter_authenticated(profile, token).await;
                Ok(())
            }
            Ok(SignInOutcome::SecondFactorRequired { user_id }) => {
                *self.inner.state.lock().await = SessionState::AwaitingSecondFactor { user_id };
                Ok(())
            }
            Err(err) => {
                *self.inner.state.lock().await = SessionState::Anonymous;
                Err(err)
            }
        }
    }

    /// Submit the second-factor code for a pending challenge.
    ///
    /// # Errors
    /// An invalid code leaves the state at `AwaitingSecondFactor` so the
    /// user can retry; transient failures do the same.
    pub async fn verify_second_factor(&self, code: &str) -> Result<(), ApiError> {
        let user_id = match &*self.inner.state.lock().await {
            SessionState::AwaitingSecondFactor { user_id } => *user_id,
            _ => {
                return Err(ApiError::Rejected {
                    status: 409,
                    message: "no second-factor challenge pending".to_string(),
                })
            }
        };

        match with_timeout(self.inner.api.verify_two_factor(user_id, code)).await {
            Ok((profile, token)) => {
                self.enter_authenticated(profile, token).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Abandon a pending second-factor challenge. Also signs out of the
    /// external provider so no half-open provider session survives.
    pub async fn cancel_second_factor(&self) {
        if let Err(err) = with_timeout(self.inner.api.sign_out_provider()).await {
            warn!("provider sign-out failed: {err}");
        }
        self.inner.force_anonymous().await;
    }

    /// Refresh the profile against the held token.
    ///
    /// Auth failures force `Anonymous`; transient failures park the session
    /// in `Degraded` keeping token and last-known profile. A refetch already
    /// in flight makes this a no-op.
    ///
    /// # Errors
    /// Returns the backend error after the state transition is applied.
    pub async fn refresh_profile(&self) -> Result<(), ApiError> {
        let token = match self.state().await.token() {
            Some(token) => token.to_string(),
            None => return Ok(()),
        };

        if self.inner.fetch_in_flight.swap(true, Ordering::SeqCst) {
            debug!("profile fetch already in flight");
            return Ok(());
        }

        let result = with_timeout(self.inner.api.fetch_me(&token)).await;
        self.inner.fetch_in_flight.store(false, Ordering::SeqCst);

        match result {
            Ok(profile) => {
                let mut state = self.inner.state.lock().await;
                if let Some(held) = state.token() {
                    // The token may have been refreshed while we fetched;
                    // keep whatever is currently held.
                    let token = held.to_string();
                    *state = SessionState::Authenticated { profile, token };
                }
                Ok(())
            }
            Err(err) if err.is_auth() => {
                self.inner.force_anonymous().await;
                Err(err)
            }
            Err(err) => {
                let mut state = self.inner.state.lock().await;
                if let (Some(profile), Some(token)) =
                    (state.profile().cloned(), state.token().map(str::to_string))
                {
                    *state = SessionState::Degraded {
                        profile,
                        token,
                        last_error: err.to_string(),
                    };
                }
                drop(state);
                Err(err)
            }
        }
    }

    /// Apply a provider-pushed event.
    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::TokenRefreshed { token } => {
                let satisfied = {
                    let mut state = self.inner.state.lock().await;
                    match &mut *state {
                        // The held profile is still valid when only the
                        // token rotated; silent refreshes stay silent.
                        SessionState::Authenticated { token: held, .. } => {
                            *held = token;
                            true
                        }
                        SessionState::Degraded { token: held, .. } => {
                            *held = token;
                            false
                        }
                        _ => return,
                    }
                };

                // Refetch only for a degraded session, and only when no
                // fetch is already in flight; a refresh must not fan out
                // into duplicate backend calls.
                if satisfied || self.inner.fetch_in_flight.load(Ordering::SeqCst) {
                    debug!("token refreshed; profile fetch skipped");
                    return;
                }
                let _ = self.refresh_profile().await;
            }
            ProviderEvent::SessionEnded => {
                self.inner.force_anonymous().await;
            }
        }
    }

    /// Sign out: best-effort provider logout, then local teardown.
    pub async fn sign_out(&self) {
        if let Err(err) = with_timeout(self.inner.api.sign_out_provider()).await {
            warn!("provider sign-out failed: {err}");
        }
        self.inner.force_anonymous().await;
    }

    async fn enter_authenticated(&self, profile: AccountProfile, token: String) {
        *self.inner.state.lock().await = SessionState::Authenticated { profile, token };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let guard = InactivityGuard::arm(self.inner.idle_timeout, async move {
            if let Some(inner) = weak.upgrade() {
                debug!("idle timeout: ending session");
                inner.force_anonymous().await;
            }
        });
        *self.inner.guard.lock().await = Some(guard);
    }
}

async fn with_timeout<T>(
    future: impl std::future::Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(CALL_TIMEOUT, future).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Transient {
            message: "request timed out".to_string(),
        }),
    }
}
