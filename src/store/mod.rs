//! Credential store: account records behind a pluggable backend.
//!
//! Two backings implement the same trait: [`postgres::PgCredentialStore`] for
//! production and [`memory::MemoryCredentialStore`] for tests and local
//! development. Behavior is identical either way; handlers only ever see
//! `Arc<dyn CredentialStore>`.
//!
//! Every operation that reads or writes a timestamp takes `now` from the
//! caller, so lockout and expiry comparisons share one UTC clock source and
//! tests can pin time.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryCredentialStore;
pub use models::{Account, AccountChanges, FailureRecord, LockoutCheck, NewAccount};
pub use postgres::PgCredentialStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account already exists")]
    Conflict,
    #[error("account not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Look up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Create an account with zeroed auth state.
    ///
    /// Fails with [`StoreError::Conflict`] if the email already exists.
    async fn create(&self, account: NewAccount, now: DateTime<Utc>)
        -> Result<Account, StoreError>;

    /// Partial merge; absent fields are left untouched. `created_at` can
    /// never be rewritten.
    async fn update(
        &self,
        id: Uuid,
        changes: AccountChanges,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Soft-delete: flips `is_active` off, the record stays.
    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, StoreError>;

    /// Record a failed login in one atomic transition.
    ///
    /// Increments the counter and stamps `last_failed_attempt`; when the
    /// post-increment count reaches `threshold` the same mutation locks the
    /// account until `now + lockout_window` and reports `just_locked`.
    async fn record_failure(
        &self,
        email: &str,
        threshold: i32,
        lockout_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailureRecord, StoreError>;

    /// Reset all failure state after a successful authentication.
    async fn record_success(&self, email: &str, now: DateTime<Utc>)
        -> Result<Account, StoreError>;

    /// Lockout gate with lazy expiry: an expired lockout is cleared (counter
    /// included) as a side effect of the check itself.
    async fn check_lockout(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LockoutCheck, StoreError>;

    /// Store a pending second-factor code, replacing any outstanding one.
    async fn store_two_factor_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn clear_two_factor_code(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Store a reset token hash, overwriting any prior outstanding token.
    async fn store_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_by_reset_token(&self, token_hash: &[u8])
        -> Result<Option<Account>, StoreError>;

    async fn clear_reset_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Single-use consume: if the token is valid and unexpired, set the new
    /// password hash, clear the token, and clear all lockout/failed-attempt
    /// state in one atomic transition. Returns `None` when the token was
    /// invalid or expired at consume time.
    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError>;
}
