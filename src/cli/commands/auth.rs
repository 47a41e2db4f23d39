use clap::{Arg, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_SUPER_ADMINS: &str = "super-admins";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ISSUER: &str = "issuer";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret for self-issued bearer tokens")
                .env("PARKWISE_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Bearer token TTL in seconds")
                .env("PARKWISE_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("PARKWISE_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SUPER_ADMINS)
                .long(ARG_SUPER_ADMINS)
                .help("Comma separated emails allowed to invite and delete users")
                .env("PARKWISE_SUPER_ADMINS")
                .default_value(""),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset and invitation links")
                .env("PARKWISE_FRONTEND_BASE_URL")
                .default_value("https://parkwise.dev"),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer label shown in authenticator apps")
                .env("PARKWISE_ISSUER")
                .default_value("Park Wise"),
        )
}
