//! # Park Wise Authentication & Session Core
//!
//! Backend and headless client logic for establishing who a caller is, what
//! they are allowed to do, and how that determination survives token expiry,
//! dual credential formats, mandatory two-factor enforcement, and client-side
//! inactivity.
//!
//! ## Credential formats
//!
//! Two independent credential formats are accepted on every request: a
//! self-issued HMAC-signed bearer token, and an externally issued
//! identity-provider token validated over HTTP. The resolver tries them in
//! that order and auto-provisions a pending profile the first time an
//! external identity is seen.
//!
//! ## Account lifecycle
//!
//! Profiles carry a role (`user`/`admin`) and a status
//! (`pending`/`approved`/`rejected`); only approved accounts can sign in.
//! Super-admin powers (invite, delete) come from a configured email
//! allow-list, not from a stored role.
//!
//! ## Two-factor
//!
//! TOTP with ten single-use backup codes. Mandatory for `user`-role
//! accounts: disable is refused server-side for non-admins.

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
