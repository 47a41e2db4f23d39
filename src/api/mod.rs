//! HTTP surface: router assembly, middleware stack, and server startup.

use crate::auth::{AuthConfig, AuthState};
use crate::store::PgCredentialStore;
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, options, patch, post},
    Extension, Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod email;
pub mod handlers;
mod openapi;

pub use openapi::openapi;

use crate::auth::provider::HttpIdentityProvider;
use email::LogEmailSender;
use handlers::{auth as auth_handlers, health};

/// External-provider connection settings, read from the CLI.
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: SecretString,
}

/// Build the application router. The auth state and pool arrive as layered
/// extensions so tests can swap in doubles.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health", options(health::health))
        .route("/auth/login", post(auth_handlers::login::login))
        .route(
            "/auth/verify-2fa-login",
            post(auth_handlers::login::verify_two_factor_login),
        )
        .route(
            "/auth/request-password-reset",
            post(auth_handlers::password::request_password_reset),
        )
        .route(
            "/auth/reset-password",
            post(auth_handlers::password::reset_password),
        )
        .route(
            "/auth/update-password",
            post(auth_handlers::password::update_password),
        )
        .route("/auth/me", get(auth_handlers::me::me))
        .route("/auth/me", patch(auth_handlers::me::update_me))
        .route("/auth/users", get(auth_handlers::users::list_users))
        .route(
            "/auth/users/invite",
            post(auth_handlers::users::invite_user),
        )
        .route("/auth/users/:id", patch(auth_handlers::users::update_user))
        .route(
            "/auth/users/:id",
            delete(auth_handlers::users::delete_user),
        )
        .route(
            "/auth/users/:id/reset-password",
            post(auth_handlers::users::admin_reset_password),
        )
        .route("/auth/2fa/status", get(auth_handlers::twofactor::status))
        .route(
            "/auth/2fa/generate",
            post(auth_handlers::twofactor::generate),
        )
        .route(
            "/auth/2fa/verify-setup",
            post(auth_handlers::twofactor::verify_setup),
        )
        .route("/auth/2fa/disable", post(auth_handlers::twofactor::disable))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: SecretString,
    auth_config: AuthConfig,
    provider: ProviderSettings,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let identity_provider =
        HttpIdentityProvider::new(&provider.base_url, provider.api_key.expose_secret().to_string())?;
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(identity_provider),
        Arc::new(LogEmailSender),
    ));

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn login_route_maps_bad_credentials_to_401() {
        let ctx = handlers::auth::testing::TestContext::new();
        let app = router().layer(Extension(ctx.state.clone()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ghost@parkwise.app","password":"nope"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let ctx = handlers::auth::testing::TestContext::new();
        let app = router().layer(Extension(ctx.state.clone()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn frontend_origin_strips_path() {
        let origin = frontend_origin("https://parkwise.app/app/").unwrap();
        assert_eq!(origin, HeaderValue::from_static("https://parkwise.app"));
    }

    #[test]
    fn frontend_origin_keeps_explicit_port() {
        let origin = frontend_origin("http://localhost:5173").unwrap();
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5173"));
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
