use crate::{api, auth::AuthConfig};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub super_admins: String,
    pub frontend_base_url: String,
    pub issuer: String,
    pub provider_url: String,
    pub provider_api_key: SecretString,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(port = args.port, "starting server");

    let auth_config = AuthConfig::new(args.token_secret, args.frontend_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_super_admins(&args.super_admins)
        .with_issuer(args.issuer);

    api::new(
        args.port,
        args.dsn,
        auth_config,
        api::ProviderSettings {
            base_url: args.provider_url,
            api_key: args.provider_api_key,
        },
    )
    .await
}
