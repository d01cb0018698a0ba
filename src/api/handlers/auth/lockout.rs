//! Failed-attempt tracking and the lockout gate.
//!
//! The gate runs before password verification on every login attempt; the
//! store clears an expired lockout as a side effect of the check itself, so
//! there is no background sweep. Crossing the failure threshold locks the
//! account and sends a best-effort notice.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::state::AuthState;
use crate::api::notify::EmailMessage;
use crate::store::{CredentialStore, FailureRecord, StoreError};

/// Record a failed login and, on the locked transition, notify the account.
///
/// Notification failures are logged and swallowed; the lockout itself has
/// already committed in the store.
pub(super) async fn record_failed_login(
    store: &dyn CredentialStore,
    auth_state: &AuthState,
    email: &str,
    now: DateTime<Utc>,
) -> Result<FailureRecord, StoreError> {
    let config = auth_state.config();
    let record = store
        .record_failure(
            email,
            config.max_failed_attempts(),
            config.lockout_window(),
            now,
        )
        .await?;

    if record.just_locked {
        info!(email = %email, "account locked after repeated failed logins");
        let outcome = auth_state
            .notifier()
            .send(&lockout_notice(auth_state, email))
            .await;
        if !outcome.success {
            error!(
                email = %email,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "failed to send lockout notice"
            );
        }
    }

    Ok(record)
}

/// User-visible message for a locked account: states the threshold, the
/// window, and the reset flow as the unlock mechanism.
pub(super) fn locked_message(auth_state: &AuthState) -> String {
    let config = auth_state.config();
    format!(
        "Account locked after {} failed login attempts. Try again in {} minutes, or reset your password to unlock immediately.",
        config.max_failed_attempts(),
        config.lockout_minutes()
    )
}

fn lockout_notice(auth_state: &AuthState, email: &str) -> EmailMessage {
    let config = auth_state.config();
    let text = format!(
        "Your account was locked after {} failed login attempts. \
         It will unlock automatically in {} minutes, or you can reset your password at {}/reset-password to unlock it now.",
        config.max_failed_attempts(),
        config.lockout_minutes(),
        config.frontend_base_url().trim_end_matches('/')
    );
    EmailMessage {
        to: email.to_string(),
        subject: "Your account has been locked".to_string(),
        html: format!("<p>{text}</p>"),
        text,
    }
}
