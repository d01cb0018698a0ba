//! Postgres credential store.
//!
//! Auth-state transitions (failure counting, lockout expiry, reset consume)
//! are single statements so concurrent attempts against the same account are
//! serialized by the row lock and the final counter is always correct.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{Account, AccountChanges, FailureRecord, LockoutCheck, NewAccount};
use super::{CredentialStore, StoreError};

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn account_from_row(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        failed_login_attempts: row.get("failed_login_attempts"),
        account_locked: row.get("account_locked"),
        lockout_expiry: row.get("lockout_expiry"),
        last_failed_attempt: row.get("last_failed_attempt"),
        two_factor_enabled: row.get("two_factor_enabled"),
        two_factor_code: row.get("two_factor_code"),
        two_factor_code_expiry: row.get("two_factor_code_expiry"),
        password_reset_token: row.get("password_reset_token"),
        password_reset_expiry: row.get("password_reset_expiry"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

const ACCOUNT_COLUMNS: &str = r"
    id, email, name, password_hash,
    failed_login_attempts, account_locked, lockout_expiry, last_failed_attempt,
    two_factor_enabled, two_factor_code, two_factor_code_expiry,
    password_reset_token, password_reset_expiry,
    is_active, created_at, updated_at
";

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .await
            .context("failed to ping database")?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to look up account by email")?;
        Ok(row.as_ref().map(account_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to look up account by id")?;
        Ok(row.as_ref().map(account_from_row))
    }

    async fn create(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            INSERT INTO accounts (email, name, password_hash, two_factor_enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(account.two_factor_enabled)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match row {
            Ok(row) => Ok(account_from_row(&row)),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(StoreError::Backend(
                anyhow::Error::new(err).context("failed to insert account"),
            )),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AccountChanges,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        // COALESCE keeps absent fields untouched; created_at is never listed.
        let query = format!(
            r"
            UPDATE accounts SET
                name = COALESCE($2, name),
                password_hash = COALESCE($3, password_hash),
                two_factor_enabled = COALESCE($4, two_factor_enabled),
                updated_at = $5
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(changes.name)
            .bind(changes.password_hash)
            .bind(changes.two_factor_enabled)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update account")?;

        row.as_ref().map(account_from_row).ok_or(StoreError::NotFound)
    }

    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts SET is_active = FALSE, updated_at = $2
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to deactivate account")?;

        row.as_ref().map(account_from_row).ok_or(StoreError::NotFound)
    }

    async fn record_failure(
        &self,
        email: &str,
        threshold: i32,
        lockout_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<FailureRecord, StoreError> {
        // The row lock on `prev` serializes concurrent failures; `was_locked`
        // lets the caller see the locked transition exactly once.
        let query = r"
            UPDATE accounts a SET
                failed_login_attempts = a.failed_login_attempts + 1,
                last_failed_attempt = $2,
                updated_at = $2,
                account_locked = a.account_locked OR a.failed_login_attempts + 1 >= $3,
                lockout_expiry = CASE
                    WHEN NOT a.account_locked AND a.failed_login_attempts + 1 >= $3 THEN $4
                    ELSE a.lockout_expiry
                END
            FROM (SELECT id, account_locked AS was_locked FROM accounts WHERE email = $1 FOR UPDATE) prev
            WHERE a.id = prev.id
            RETURNING
                a.id, a.email, a.name, a.password_hash,
                a.failed_login_attempts, a.account_locked, a.lockout_expiry, a.last_failed_attempt,
                a.two_factor_enabled, a.two_factor_code, a.two_factor_code_expiry,
                a.password_reset_token, a.password_reset_expiry,
                a.is_active, a.created_at, a.updated_at,
                prev.was_locked
        ";
        let row = sqlx::query(query)
            .bind(email)
            .bind(now)
            .bind(threshold)
            .bind(now + lockout_window)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to record login failure")?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let was_locked: bool = row.get("was_locked");
        let account = account_from_row(&row);
        let just_locked = !was_locked && account.account_locked;
        Ok(FailureRecord {
            account,
            just_locked,
        })
    }

    async fn record_success(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            r"
            UPDATE accounts SET
                failed_login_attempts = 0,
                account_locked = FALSE,
                lockout_expiry = NULL,
                last_failed_attempt = NULL,
                updated_at = $2
            WHERE email = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(email)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to record login success")?;

        row.as_ref().map(account_from_row).ok_or(StoreError::NotFound)
    }

    async fn check_lockout(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LockoutCheck, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin lockout check transaction")?;

        // Lazy expiry inside the same transaction as the snapshot read.
        let query = r"
            UPDATE accounts SET
                failed_login_attempts = 0,
                account_locked = FALSE,
                lockout_expiry = NULL,
                last_failed_attempt = NULL,
                updated_at = $2
            WHERE email = $1
              AND account_locked
              AND (lockout_expiry IS NULL OR lockout_expiry <= $2)
        ";
        sqlx::query(query)
            .bind(email)
            .bind(now)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to clear expired lockout")?;

        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to read account for lockout check")?;

        tx.commit()
            .await
            .context("failed to commit lockout check transaction")?;

        let Some(row) = row else {
            return Ok(LockoutCheck::NotFound);
        };
        let account = account_from_row(&row);
        match (account.account_locked, account.lockout_expiry) {
            (true, Some(until)) => Ok(LockoutCheck::Locked { until }),
            _ => Ok(LockoutCheck::Clear(Box::new(account))),
        }
    }

    async fn store_two_factor_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts SET two_factor_code = $2, two_factor_code_expiry = $3, updated_at = $4
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(code)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to store second-factor code")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_two_factor_code(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts SET two_factor_code = NULL, two_factor_code_expiry = NULL, updated_at = $2
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to clear second-factor code")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn store_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Overwrites any outstanding token: one active reset per account.
        let query = r"
            UPDATE accounts SET password_reset_token = $2, password_reset_expiry = $3, updated_at = $4
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to store reset token")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE password_reset_token = $1");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to look up account by reset token")?;
        Ok(row.as_ref().map(account_from_row))
    }

    async fn clear_reset_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts SET password_reset_token = NULL, password_reset_expiry = NULL, updated_at = $2
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to clear reset token")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StoreError> {
        // Valid token: swap the password, clear the token, and unlock, all in
        // one statement so the token is single-use under concurrency.
        let query = format!(
            r"
            UPDATE accounts SET
                password_hash = $2,
                password_reset_token = NULL,
                password_reset_expiry = NULL,
                failed_login_attempts = 0,
                account_locked = FALSE,
                lockout_expiry = NULL,
                last_failed_attempt = NULL,
                updated_at = $3
            WHERE password_reset_token = $1
              AND password_reset_expiry IS NOT NULL
              AND password_reset_expiry > $3
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(new_password_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to consume reset token")?;

        if let Some(row) = row {
            return Ok(Some(account_from_row(&row)));
        }

        // Expired tokens are cleared on the failed consume attempt.
        let query = r"
            UPDATE accounts SET password_reset_token = NULL, password_reset_expiry = NULL, updated_at = $2
            WHERE password_reset_token = $1
              AND (password_reset_expiry IS NULL OR password_reset_expiry <= $2)
        ";
        sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to clear expired reset token")?;

        Ok(None)
    }
}
