//! Auth configuration and shared handler state.

use chrono::Duration;
use std::sync::Arc;

use super::password::BCRYPT_COST;
use super::token::SessionKeys;
use crate::api::notify::Notifier;

const DEFAULT_MAX_FAILED_ATTEMPTS: i32 = 5;
const DEFAULT_LOCKOUT_MINUTES: i64 = 30;
const DEFAULT_TWO_FACTOR_TTL_MINUTES: i64 = 10;
const DEFAULT_RESET_TOKEN_TTL_MINUTES: i64 = 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    max_failed_attempts: i32,
    lockout_minutes: i64,
    two_factor_ttl_minutes: i64,
    reset_token_ttl_minutes: i64,
    session_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            two_factor_ttl_minutes: DEFAULT_TWO_FACTOR_TTL_MINUTES,
            reset_token_ttl_minutes: DEFAULT_RESET_TOKEN_TTL_MINUTES,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            bcrypt_cost: BCRYPT_COST,
        }
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: i32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_minutes(mut self, minutes: i64) -> Self {
        self.lockout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_two_factor_ttl_minutes(mut self, minutes: i64) -> Self {
        self.two_factor_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.reset_token_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> i32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_window(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }

    #[must_use]
    pub fn two_factor_ttl(&self) -> Duration {
        Duration::minutes(self.two_factor_ttl_minutes)
    }

    #[must_use]
    pub fn reset_token_ttl(&self) -> Duration {
        Duration::minutes(self.reset_token_ttl_minutes)
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

/// Shared state for auth handlers: config, signing keys, and the notifier.
pub struct AuthState {
    config: AuthConfig,
    keys: SessionKeys,
    notifier: Arc<dyn Notifier>,
}

impl AuthState {
    pub fn new(config: AuthConfig, keys: SessionKeys, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            keys,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::notify::LogNotifier;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://heredi.dev".to_string());
        assert_eq!(config.frontend_base_url(), "https://heredi.dev");
        assert_eq!(config.max_failed_attempts(), 5);
        assert_eq!(config.lockout_window(), Duration::minutes(30));
        assert_eq!(config.two_factor_ttl(), Duration::minutes(10));
        assert_eq!(config.reset_token_ttl(), Duration::minutes(60));
        assert_eq!(config.session_ttl(), Duration::hours(24));
        assert_eq!(config.bcrypt_cost(), BCRYPT_COST);

        let config = config
            .with_max_failed_attempts(3)
            .with_lockout_minutes(5)
            .with_two_factor_ttl_minutes(1)
            .with_reset_token_ttl_minutes(2)
            .with_session_ttl_seconds(60)
            .with_bcrypt_cost(4);
        assert_eq!(config.max_failed_attempts(), 3);
        assert_eq!(config.lockout_window(), Duration::minutes(5));
        assert_eq!(config.two_factor_ttl(), Duration::minutes(1));
        assert_eq!(config.reset_token_ttl(), Duration::minutes(2));
        assert_eq!(config.session_ttl(), Duration::seconds(60));
        assert_eq!(config.bcrypt_cost(), 4);
    }

    #[test]
    fn auth_state_exposes_parts() {
        let state = AuthState::new(
            AuthConfig::new("https://heredi.dev".to_string()),
            SessionKeys::new(b"secret"),
            Arc::new(LogNotifier),
        );
        assert_eq!(state.config().max_failed_attempts(), 5);
    }
}
