//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration state.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let jwt_secret = matches
        .get_one::<String>("jwt-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --jwt-secret")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing required argument: --frontend-base-url")?;
    let session_ttl_seconds = matches
        .get_one::<i64>("session-ttl-seconds")
        .copied()
        .unwrap_or(86400);
    let notify_url = matches.get_one::<String>("notify-url").cloned();
    let notify_token = matches
        .get_one::<String>("notify-token")
        .cloned()
        .map_or_else(|| SecretString::from(String::new()), SecretString::from);

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret,
        frontend_base_url,
        session_ttl_seconds,
        notify_url,
        notify_token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("HEREDI_NOTIFY_URL", None::<&str>),
                ("HEREDI_NOTIFY_TOKEN", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "heredi",
                    "--dsn",
                    "postgres://user@localhost:5432/heredi",
                    "--jwt-secret",
                    "super-secret",
                ]);
                let action = handler(&matches).expect("action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/heredi");
                assert_eq!(args.jwt_secret.expose_secret(), "super-secret");
                assert_eq!(args.frontend_base_url, "https://heredi.dev");
                assert_eq!(args.session_ttl_seconds, 86400);
                assert!(args.notify_url.is_none());
            },
        );
    }
}
