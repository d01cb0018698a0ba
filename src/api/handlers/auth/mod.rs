//! Auth handlers and supporting modules.
//!
//! This module coordinates the account authentication lifecycle: registration,
//! login with account lockout, email second factor, password reset, and
//! bearer-session verification.
//!
//! ## Lockout
//!
//! Five consecutive failed logins lock an account for thirty minutes. The
//! lockout gate runs before password verification and clears expired lockouts
//! lazily; a successful password reset always unlocks.
//!
//! ## Second factor
//!
//! Accounts with 2FA enabled receive a 6-digit emailed code valid for ten
//! minutes. The pending login is carried in a short-lived signed ticket, but
//! the code is only ever validated against the account's stored state.

mod lockout;
pub(crate) mod login;
mod password;
pub(crate) mod register;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
mod token;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;

pub use password::{hash_password, validate_password_policy, verify_password};
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, SessionKeys, TokenError};
pub use utils::{normalize_email, valid_email};

#[cfg(test)]
pub(crate) mod test_support {
    use super::{AuthConfig, AuthState, SessionKeys};
    use crate::api::notify::{EmailMessage, Notifier, SendOutcome};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Test double that records every message instead of delivering it.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        sent: Mutex<Vec<EmailMessage>>,
        pub(crate) fail_sends: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_sends: true,
            }
        }

        pub(crate) async fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &EmailMessage) -> SendOutcome {
            self.sent.lock().await.push(message.clone());
            if self.fail_sends {
                SendOutcome {
                    success: false,
                    message_id: None,
                    error: Some("recording notifier configured to fail".to_string()),
                }
            } else {
                SendOutcome {
                    success: true,
                    message_id: Some("recorded".to_string()),
                    error: None,
                }
            }
        }
    }

    pub(crate) fn auth_state_with_notifier(notifier: Arc<RecordingNotifier>) -> AuthState {
        AuthState::new(
            AuthConfig::new("https://heredi.dev".to_string()).with_bcrypt_cost(4),
            SessionKeys::new(b"test-secret-key"),
            notifier,
        )
    }
}

#[cfg(test)]
mod tests;
