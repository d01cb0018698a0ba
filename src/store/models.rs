//! Account records as persisted by the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored account with its full authentication state.
///
/// Invariants maintained by the store:
/// - `account_locked` implies `lockout_expiry` is set.
/// - Only crossing the failed-attempt threshold sets `account_locked`.
/// - `password_reset_token` holds a SHA-256 hash, never the raw token, and is
///   cleared on first successful consume or on expiry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub failed_login_attempts: i32,
    pub account_locked: bool,
    pub lockout_expiry: Option<DateTime<Utc>>,
    pub last_failed_attempt: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub two_factor_code: Option<String>,
    pub two_factor_code_expiry: Option<DateTime<Utc>>,
    pub password_reset_token: Option<Vec<u8>>,
    pub password_reset_expiry: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create an account; all auth state starts zeroed.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
}

/// Partial update applied by `CredentialStore::update`.
///
/// `created_at` is intentionally absent; callers can never rewrite it.
#[derive(Clone, Debug, Default)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub two_factor_enabled: Option<bool>,
}

/// Result of recording a failed login attempt.
///
/// `just_locked` is true only for the attempt that crossed the threshold, so
/// the lockout notice is sent exactly once even under concurrent failures.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    pub account: Account,
    pub just_locked: bool,
}

/// Outcome of the lockout gate check for one login attempt.
#[derive(Clone, Debug)]
pub enum LockoutCheck {
    /// No account with this email.
    NotFound,
    /// Account is locked until the given time.
    Locked { until: DateTime<Utc> },
    /// Account is not locked; the snapshot is returned for password checks.
    Clear(Box<Account>),
}
