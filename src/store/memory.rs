//! In-memory credential store for tests and local development.
//!
//! A single `RwLock` guards both the account map and the email index, so
//! every transition observes one consistent snapshot. This is the backend the
//! auth flow tests run against.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Account, AccountChanges, FailureRecord, LockoutCheck, NewAccount};
use super::{CredentialStore, StoreError};
use async_trait::async_trait;

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn get_by_email(&self, email: &str) -> Option<&Account> {
        self.by_email.get(email).and_then(|id| self.accounts.get(id))
    }

    fn get_mut_by_email(&mut self, email: &str) -> Option<&mut Account> {
        let id = self.by_email.get(email).copied()?;
        self.accounts.get_mut(&id)
    }
}

fn clear_failure_state(account: &mut Account) {
    account.failed_login_attempts = 0;
    account.account_locked = false;
    account.lockout_expiry = None;
    account.last_failed_attempt = None;
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.get_by_email(email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn create(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(&account.email) {
            return Err(StoreError::Conflict);
        }

        let record = Account {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            name: account.name,
            password_hash: account.password_hash,
            failed_login_attempts: 0,
            account_locked: false,
            lockout_expiry: None,
            last_failed_attempt: None,
            two_factor_enabled: account.two_factor_enabled,
            two_factor_code: None,
            two_factor_code_expiry: None,
            password_reset_token: None,
            password_reset_expiry: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        inner.by_email.insert(account.email, record.id);
        inner.accounts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AccountChanges,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(name) = changes.name {
            account.name = name;
        }
        if let Some(password_hash) = changes.password_hash {
            account.password_hash = password_hash;
        }
        if let Some(two_factor_enabled) = changes.two_factor_enabled {
            account.two_factor_enabled = two_factor_enabled;
        }
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.is_active = false;
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn record_failure(
        &self,
        email: &str,
        threshold: i32,
        lockout_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailureRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.get_mut_by_email(email).ok_or(StoreError::NotFound)?;

        account.failed_login_attempts += 1;
        account.last_failed_attempt = Some(now);
        account.updated_at = now;

        let just_locked = !account.account_locked && account.failed_login_attempts >= threshold;
        if just_locked {
            account.account_locked = true;
            account.lockout_expiry = Some(now + lockout_window);
        }

        Ok(FailureRecord {
            account: account.clone(),
            just_locked,
        })
    }

    async fn record_success(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.get_mut_by_email(email).ok_or(StoreError::NotFound)?;
        clear_failure_state(account);
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn check_lockout(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LockoutCheck, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(account) = inner.get_mut_by_email(email) else {
            return Ok(LockoutCheck::NotFound);
        };

        if account.account_locked {
            match account.lockout_expiry {
                Some(until) if now < until => return Ok(LockoutCheck::Locked { until }),
                _ => {
                    // Lazy expiry: the check itself clears the stale lockout.
                    clear_failure_state(account);
                    account.updated_at = now;
                }
            }
        }

        Ok(LockoutCheck::Clear(Box::new(account.clone())))
    }

    async fn store_two_factor_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.two_factor_code = Some(code.to_string());
        account.two_factor_code_expiry = Some(expires_at);
        account.updated_at = now;
        Ok(())
    }

    async fn clear_two_factor_code(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.two_factor_code = None;
        account.two_factor_code_expiry = None;
        account.updated_at = now;
        Ok(())
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.password_reset_token = Some(token_hash.to_vec());
        account.password_reset_expiry = Some(expires_at);
        account.updated_at = now;
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|account| account.password_reset_token.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn clear_reset_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.password_reset_token = None;
        account.password_reset_expiry = None;
        account.updated_at = now;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .values_mut()
            .find(|account| account.password_reset_token.as_deref() == Some(token_hash));

        let Some(account) = account else {
            return Ok(None);
        };

        match account.password_reset_expiry {
            Some(expiry) if now < expiry => {}
            _ => {
                // Expired token: consuming it only clears it.
                account.password_reset_token = None;
                account.password_reset_expiry = None;
                account.updated_at = now;
                return Ok(None);
            }
        }

        account.password_hash = new_password_hash.to_string();
        account.password_reset_token = None;
        account.password_reset_expiry = None;
        clear_failure_state(account);
        account.updated_at = now;
        Ok(Some(account.clone()))
    }
}
