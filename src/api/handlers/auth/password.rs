//! Password hashing and policy checks.

use anyhow::{anyhow, Context, Result};
use bcrypt::DEFAULT_COST;

/// Minimum password length, applied uniformly at registration and reset.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length (bcrypt has a 72-byte limit).
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Default bcrypt cost factor for password hashing.
pub const BCRYPT_COST: u32 = DEFAULT_COST;

/// Hash a password with bcrypt on the blocking pool.
///
/// The cost comes from configuration so tests can use a cheap factor.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task is cancelled.
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, cost).context("failed to hash password")
    })
    .await
    .context("password hashing task failed")?
}

/// Verify a password against a stored bcrypt hash on the blocking pool.
///
/// # Errors
/// Returns an error if the hash is malformed or the blocking task is cancelled.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password, &hash).context("failed to verify password")
    })
    .await
    .context("password verification task failed")?
}

/// Hash used when no account matches, so unknown emails cost the same
/// bcrypt verification as wrong passwords.
pub(super) const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$C6UzMDM.H6dfI/f/IKcEeO7ZnAmKPs6sVsLFNUsSOa7WGWSyXRyXW";

/// Check the password policy, aggregating every unmet requirement into a
/// single message rather than stopping at the first failure.
///
/// # Errors
/// Returns an error listing all unmet requirements.
pub fn validate_password_policy(password: &str) -> Result<()> {
    let mut problems = Vec::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        problems.push(format!("at least {MIN_PASSWORD_LENGTH} characters"));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        problems.push(format!("at most {MAX_PASSWORD_LENGTH} characters"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("a digit".to_string());
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        problems.push("a symbol".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Password must contain {}", problems.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify_round_trip() -> Result<()> {
        let hash = hash_password("Aa1!aaaa", 4).await?;
        assert!(hash.starts_with("$2b$"));
        assert!(verify_password("Aa1!aaaa", &hash).await?);
        assert!(!verify_password("Aa1!aaab", &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn dummy_hash_verifies_without_error() -> Result<()> {
        assert!(!verify_password("anything", DUMMY_PASSWORD_HASH).await?);
        Ok(())
    }

    #[test]
    fn policy_accepts_compliant_password() {
        assert!(validate_password_policy("Aa1!aaaa").is_ok());
        assert!(validate_password_policy("NewPass1!").is_ok());
    }

    #[test]
    fn policy_aggregates_all_unmet_requirements() {
        let err = validate_password_policy("aaa").expect_err("should fail");
        let message = err.to_string();
        assert!(message.contains("at least 8 characters"));
        assert!(message.contains("an uppercase letter"));
        assert!(message.contains("a digit"));
        assert!(message.contains("a symbol"));
        assert!(!message.contains("a lowercase letter"));
    }

    #[test]
    fn policy_rejects_single_missing_class() {
        let err = validate_password_policy("Aa1aaaaa").expect_err("should fail");
        assert_eq!(err.to_string(), "Password must contain a symbol");
    }
}
