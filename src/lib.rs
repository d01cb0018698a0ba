//! # Heredi (Account & Authentication Service)
//!
//! `heredi` is the account lifecycle and authentication authority for the
//! Heredi estate-planning platform. It owns registration, login with
//! account lockout, an email second factor, password reset, and
//! bearer-session verification.
//!
//! ## Lockout
//!
//! Five consecutive failed logins lock an account for thirty minutes. The
//! lockout is checked (and lazily expired) before password verification on
//! every attempt, and a successful password reset always unlocks.
//!
//! ## Enumeration resistance
//!
//! Unknown emails and wrong passwords are indistinguishable: the login
//! response is identical and a dummy hash verification keeps timing flat.
//! `forgot-password` reports the same generic success whether or not the
//! email exists.
//!
//! ## Storage
//!
//! Accounts live behind the pluggable [`store::CredentialStore`] trait: a
//! Postgres backend in production and an in-memory map in tests, with
//! identical behavior.

pub mod api;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
