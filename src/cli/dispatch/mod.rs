//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, provider};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --token-secret")?;
    let provider_url = matches
        .get_one::<String>(provider::ARG_PROVIDER_URL)
        .cloned()
        .context("missing required argument: --provider-url")?;
    let provider_api_key = matches
        .get_one::<String>(provider::ARG_PROVIDER_API_KEY)
        .cloned()
        .context("missing required argument: --provider-api-key")?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        token_secret: SecretString::from(token_secret),
        token_ttl_seconds: matches
            .get_one::<i64>(auth::ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(86400),
        reset_token_ttl_seconds: matches
            .get_one::<i64>(auth::ARG_RESET_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(3600),
        super_admins: matches
            .get_one::<String>(auth::ARG_SUPER_ADMINS)
            .cloned()
            .unwrap_or_default(),
        frontend_base_url: matches
            .get_one::<String>(auth::ARG_FRONTEND_BASE_URL)
            .cloned()
            .unwrap_or_else(|| "https://parkwise.dev".to_string()),
        issuer: matches
            .get_one::<String>(auth::ARG_ISSUER)
            .cloned()
            .unwrap_or_else(|| "Park Wise".to_string()),
        provider_url,
        provider_api_key: SecretString::from(provider_api_key),
    }))
}
