//! `OpenAPI` document derived from the annotated handlers.

use utoipa::OpenApi;

use super::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::login::verify_two_factor_login,
        auth::password::request_password_reset,
        auth::password::reset_password,
        auth::password::update_password,
        auth::me::me,
        auth::me::update_me,
        auth::users::list_users,
        auth::users::invite_user,
        auth::users::update_user,
        auth::users::delete_user,
        auth::users::admin_reset_password,
        auth::twofactor::status,
        auth::twofactor::generate,
        auth::twofactor::verify_setup,
        auth::twofactor::disable,
    ),
    tags(
        (name = "health", description = "Liveness and dependency checks"),
        (name = "auth", description = "Login, password, and profile self-service"),
        (name = "users", description = "Admin user management"),
        (name = "two-factor", description = "Two-factor enrollment"),
    )
)]
struct ApiDoc;

/// Generated `OpenAPI` spec, used by the `openapi` CLI action.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_contains_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/health",
            "/auth/login",
            "/auth/verify-2fa-login",
            "/auth/request-password-reset",
            "/auth/reset-password",
            "/auth/update-password",
            "/auth/me",
            "/auth/users",
            "/auth/users/invite",
            "/auth/users/{id}",
            "/auth/users/{id}/reset-password",
            "/auth/2fa/status",
            "/auth/2fa/generate",
            "/auth/2fa/verify-setup",
            "/auth/2fa/disable",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }
}
