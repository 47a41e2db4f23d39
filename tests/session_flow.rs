//! End-to-end session controller flows against a scripted backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use parkwise::client::{
    AccountProfile, ApiError, AuthApi, ProviderEvent, SessionController, SessionState,
    SignInOutcome,
};
use parkwise::store::{AccountStatus, Role};

fn officer_profile() -> AccountProfile {
    AccountProfile {
        id: Uuid::new_v4(),
        email: "officer@parkwise.app".to_string(),
        full_name: "officer".to_string(),
        role: Role::User,
        status: AccountStatus::Approved,
        two_factor_enabled: true,
    }
}

enum MeScript {
    Reply(Result<AccountProfile, ApiError>),
    /// Never resolves within the call timeout.
    Hang,
}

struct ScriptedApi {
    sign_in_outcome: Mutex<Option<Result<SignInOutcome, ApiError>>>,
    verify_replies: Mutex<VecDeque<Result<(AccountProfile, String), ApiError>>>,
    me_replies: Mutex<VecDeque<MeScript>>,
    me_calls: AtomicUsize,
    provider_sign_outs: AtomicUsize,
}

impl ScriptedApi {
    fn new() -> Self {
        Self {
            sign_in_outcome: Mutex::new(None),
            verify_replies: Mutex::new(VecDeque::new()),
            me_replies: Mutex::new(VecDeque::new()),
            me_calls: AtomicUsize::new(0),
            provider_sign_outs: AtomicUsize::new(0),
        }
    }

    fn script_sign_in(&self, outcome: Result<SignInOutcome, ApiError>) {
        *self.sign_in_outcome.lock().unwrap() = Some(outcome);
    }

    fn script_verify(&self, reply: Result<(AccountProfile, String), ApiError>) {
        self.verify_replies.lock().unwrap().push_back(reply);
    }

    fn script_me(&self, script: MeScript) {
        self.me_replies.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl AuthApi for ScriptedApi {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<SignInOutcome, ApiError> {
        self.sign_in_outcome
            .lock()
            .unwrap()
            .take()
            .expect("unscripted sign_in call")
    }

    async fn verify_two_factor(
        &self,
        _user_id: Uuid,
        _code: &str,
    ) -> Result<(AccountProfile, String), ApiError> {
        self.verify_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted verify_two_factor call")
    }

    async fn fetch_me(&self, _token: &str) -> Result<AccountProfile, ApiError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .me_replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted fetch_me call");
        match script {
            MeScript::Reply(reply) => reply,
            MeScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung fetch_me resolved")
            }
        }
    }

    async fn sign_out_provider(&self) -> Result<(), ApiError> {
        self.provider_sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn authenticated_controller(
    profile: AccountProfile,
    token: &str,
) -> (SessionController, Arc<ScriptedApi>) {
    let api = Arc::new(ScriptedApi::new());
    api.script_sign_in(Ok(SignInOutcome::Complete {
        profile,
        token: token.to_string(),
    }));
    let controller = SessionController::new(api.clone());
    controller
        .sign_in("officer@parkwise.app", "correct-pass")
        .await
        .unwrap();
    (controller, api)
}

#[tokio::test(start_paused = true)]
async fn two_factor_challenge_flow() {
    let profile = officer_profile();
    let api = Arc::new(ScriptedApi::new());
    api.script_sign_in(Ok(SignInOutcome::SecondFactorRequired {
        user_id: profile.id,
    }));
    let controller = SessionController::new(api.clone());

    controller
        .sign_in("officer@parkwise.app", "correct-pass")
        .await
        .unwrap();
    assert!(matches!(
        controller.state().await,
        SessionState::AwaitingSecondFactor { .. }
    ));

    // Wrong code: error surfaced, challenge still pending.
    api.script_verify(Err(ApiError::Auth { status: 401 }));
    let err = controller.verify_second_factor("000000").await.unwrap_err();
    assert!(err.is_auth());
    assert!(matches!(
        controller.state().await,
        SessionState::AwaitingSecondFactor { .. }
    ));

    api.script_verify(Ok((profile.clone(), "issued-token".to_string())));
    controller.verify_second_factor("123456").await.unwrap();
    match controller.state().await {
        SessionState::Authenticated { token, .. } => assert_eq!(token, "issued-token"),
        other => panic!("expected Authenticated, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_challenge_signs_out_of_provider() {
    let api = Arc::new(ScriptedApi::new());
    api.script_sign_in(Ok(SignInOutcome::SecondFactorRequired {
        user_id: Uuid::new_v4(),
    }));
    let controller = SessionController::new(api.clone());
    controller
        .sign_in("officer@parkwise.app", "correct-pass")
        .await
        .unwrap();

    controller.cancel_second_factor().await;

    assert!(matches!(controller.state().await, SessionState::Anonymous));
    assert_eq!(api.provider_sign_outs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn profile_fetch_timeout_degrades_without_logout() {
    let profile = officer_profile();
    let (controller, api) = authenticated_controller(profile.clone(), "held-token").await;

    api.script_me(MeScript::Hang);
    let err = controller.refresh_profile().await.unwrap_err();
    assert!(matches!(err, ApiError::Transient { .. }));

    match controller.state().await {
        SessionState::Degraded { profile: kept, token, .. } => {
            assert_eq!(kept.email, profile.email);
            assert_eq!(token, "held-token");
        }
        other => panic!("expected Degraded, got {other:?}"),
    }

    // A later successful refetch recovers without a new sign-in.
    api.script_me(MeScript::Reply(Ok(profile)));
    controller.refresh_profile().await.unwrap();
    assert!(controller.state().await.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn expired_token_rejection_forces_anonymous() {
    let (controller, api) = authenticated_controller(officer_profile(), "stale-token").await;

    api.script_me(MeScript::Reply(Err(ApiError::Auth { status: 401 })));
    let err = controller.refresh_profile().await.unwrap_err();
    assert!(err.is_auth());
    assert!(matches!(controller.state().await, SessionState::Anonymous));
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_ends_session_locally() {
    let (controller, api) = authenticated_controller(officer_profile(), "held-token").await;
    let calls_before = api.me_calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(61 * 60)).await;

    assert!(matches!(controller.state().await, SessionState::Anonymous));
    // No server call was needed to end the session.
    assert_eq!(api.me_calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test(start_paused = true)]
async fn interaction_keeps_session_alive() {
    let (controller, _api) = authenticated_controller(officer_profile(), "held-token").await;

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(40 * 60)).await;
        controller.touch().await;
    }

    assert!(controller.state().await.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn silent_token_refresh_updates_token_without_refetch() {
    let (controller, api) = authenticated_controller(officer_profile(), "first-token").await;
    let calls_before = api.me_calls.load(Ordering::SeqCst);

    // Fresh sign-in already satisfied this token generation; the refresh
    // replaces the token but must not fan out into a backend call.
    controller
        .handle_provider_event(ProviderEvent::TokenRefreshed {
            token: "second-token".to_string(),
        })
        .await;

    assert_eq!(api.me_calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(controller.state().await.token(), Some("second-token"));
}

#[tokio::test(start_paused = true)]
async fn provider_session_end_is_hard_sign_out() {
    let (controller, _api) = authenticated_controller(officer_profile(), "held-token").await;

    controller
        .handle_provider_event(ProviderEvent::SessionEnded)
        .await;

    assert!(matches!(controller.state().await, SessionState::Anonymous));
}
