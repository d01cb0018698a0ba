use crate::api;
use crate::api::handlers::auth::{AuthConfig, AuthState, SessionKeys};
use crate::api::notify::{HttpNotifier, LogNotifier, Notifier};
use crate::store::{CredentialStore, PgCredentialStore};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub notify_url: Option<String>,
    pub notify_token: SecretString,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let store: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool));

    let notifier: Arc<dyn Notifier> = match &args.notify_url {
        Some(url) => {
            info!(endpoint = %url, "using HTTP mail delivery");
            Arc::new(HttpNotifier::new(url.clone(), args.notify_token)?)
        }
        None => {
            info!("no mail delivery endpoint configured; emails are logged");
            Arc::new(LogNotifier)
        }
    };

    let config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);
    let keys = SessionKeys::new(args.jwt_secret.expose_secret().as_bytes());
    let auth_state = Arc::new(AuthState::new(config, keys, notifier));

    api::new(args.port, store, auth_state).await
}
