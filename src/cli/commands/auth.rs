use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_notify_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("Secret used to sign session tokens")
                .env("HEREDI_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for CORS and reset links")
                .env("HEREDI_FRONTEND_BASE_URL")
                .default_value("https://heredi.dev"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token TTL in seconds")
                .env("HEREDI_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_notify_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("notify-url")
                .long("notify-url")
                .help("Mail delivery API endpoint; emails are logged when unset")
                .env("HEREDI_NOTIFY_URL"),
        )
        .arg(
            Arg::new("notify-token")
                .long("notify-token")
                .help("Bearer token for the mail delivery API")
                .env("HEREDI_NOTIFY_TOKEN")
                .hide_env_values(true),
        )
}
