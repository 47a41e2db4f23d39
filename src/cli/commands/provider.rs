use clap::{Arg, Command};

pub const ARG_PROVIDER_URL: &str = "provider-url";
pub const ARG_PROVIDER_API_KEY: &str = "provider-api-key";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROVIDER_URL)
                .long(ARG_PROVIDER_URL)
                .help("Base URL of the external identity provider")
                .env("PARKWISE_PROVIDER_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PROVIDER_API_KEY)
                .long(ARG_PROVIDER_API_KEY)
                .help("API key sent alongside provider token validation calls")
                .env("PARKWISE_PROVIDER_API_KEY")
                .required(true),
        )
}
