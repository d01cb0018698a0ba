//! End-to-end auth flow tests over the in-memory credential store.

use anyhow::{Context, Result};
use axum::extract::Extension;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::test_support::{auth_state_with_notifier, RecordingNotifier};
use super::types::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    ResetPasswordRequest, SessionResponse, UserResponse, VerifyTwoFactorRequest,
};
use super::{login, register, reset, session, two_factor, AuthConfig, AuthState, SessionKeys};
use crate::store::{CredentialStore, MemoryCredentialStore};

struct Harness {
    store: Arc<MemoryCredentialStore>,
    auth_state: Arc<AuthState>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AuthConfig::new("https://heredi.dev".to_string()))
    }

    fn with_config(config: AuthConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let auth_state = Arc::new(AuthState::new(
            // Cheap bcrypt keeps the flow tests fast.
            config.with_bcrypt_cost(4),
            SessionKeys::new(b"test-secret-key"),
            notifier.clone(),
        ));
        Self {
            store: Arc::new(MemoryCredentialStore::new()),
            auth_state,
            notifier,
        }
    }

    fn store_ext(&self) -> Extension<Arc<dyn CredentialStore>> {
        Extension(self.store.clone() as Arc<dyn CredentialStore>)
    }

    fn state_ext(&self) -> Extension<Arc<AuthState>> {
        Extension(self.auth_state.clone())
    }

    async fn register(&self, email: &str, password: &str, name: &str) -> Response {
        register::register(
            self.store_ext(),
            self.state_ext(),
            Some(Json(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                name: name.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn login(&self, email: &str, password: &str) -> Response {
        login::login(
            self.store_ext(),
            self.state_ext(),
            Some(Json(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn forgot_password(&self, email: &str) -> Response {
        reset::forgot_password(
            self.store_ext(),
            self.state_ext(),
            Some(Json(ForgotPasswordRequest {
                email: email.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Response {
        reset::reset_password(
            self.store_ext(),
            self.state_ext(),
            Some(Json(ResetPasswordRequest {
                token: token.to_string(),
                new_password: new_password.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn verify_two_factor(&self, email: &str, code: &str, ticket: &str) -> Response {
        two_factor::verify_two_factor(
            self.store_ext(),
            self.state_ext(),
            Some(Json(VerifyTwoFactorRequest {
                email: email.to_string(),
                verification_code: code.to_string(),
                temp_token: ticket.to_string(),
            })),
        )
        .await
        .into_response()
    }

    async fn verify_session(&self, bearer: Option<&str>) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
            headers.insert(AUTHORIZATION, value);
        }
        session::verify(headers, self.store_ext(), self.state_ext())
            .await
            .into_response()
    }

    /// Pull the most recent reset token out of the recorded reset email.
    async fn last_reset_token(&self) -> Option<String> {
        self.notifier
            .sent()
            .await
            .iter()
            .rev()
            .find_map(|message| {
                message
                    .text
                    .split("#token=")
                    .nth(1)
                    .map(|token| token.trim().to_string())
            })
    }

    /// Pull the most recent 6-digit code out of the recorded 2FA email.
    async fn last_two_factor_code(&self) -> Option<String> {
        self.notifier.sent().await.iter().rev().find_map(|message| {
            message
                .text
                .split_whitespace()
                .map(|word| word.trim_matches(|c: char| !c.is_ascii_digit()))
                .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to decode response body")
}

async fn read_bytes(response: Response) -> Result<Vec<u8>> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .context("failed to read response body")?;
    Ok(bytes.to_vec())
}

#[tokio::test]
async fn register_returns_session_and_user() -> Result<()> {
    let harness = Harness::new();
    let response = harness
        .register("Alice@Example.com", "Aa1!aaaa", "Alice")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: SessionResponse = read_json(response).await?;
    assert!(body.success);
    assert_eq!(body.user.email, "alice@example.com");
    assert!(!body.token.is_empty());

    let verified = harness.verify_session(Some(&body.token)).await;
    assert_eq!(verified.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn register_duplicate_email_conflicts() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;
    let response = harness
        .register(" ALICE@example.com ", "Aa1!aaaa", "Alice")
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: MessageResponse = read_json(response).await?;
    assert!(!body.success);
    Ok(())
}

#[tokio::test]
async fn register_weak_password_lists_every_problem() -> Result<()> {
    let harness = Harness::new();
    let response = harness.register("alice@example.com", "short", "Alice").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: MessageResponse = read_json(response).await?;
    assert!(body.message.contains("at least 8 characters"));
    assert!(body.message.contains("an uppercase letter"));
    assert!(body.message.contains("a digit"));
    assert!(body.message.contains("a symbol"));
    Ok(())
}

#[tokio::test]
async fn login_unknown_email_is_generic_unauthorized() -> Result<()> {
    let harness = Harness::new();
    let response = harness.login("ghost@example.com", "Aa1!aaaa").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: MessageResponse = read_json(response).await?;
    assert_eq!(body.message, "Invalid email or password");
    Ok(())
}

#[tokio::test]
async fn login_wrong_password_matches_unknown_email_response() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    let wrong = harness.login("alice@example.com", "Wrong1!aa").await;
    let unknown = harness.login("ghost@example.com", "Wrong1!aa").await;
    assert_eq!(wrong.status(), unknown.status());
    assert_eq!(read_bytes(wrong).await?, read_bytes(unknown).await?);
    Ok(())
}

#[tokio::test]
async fn five_failures_lock_and_correct_password_stays_rejected() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    for _ in 0..4 {
        let response = harness.login("alice@example.com", "Wrong1!aa").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Fifth failure crosses the threshold and already answers as locked.
    let fifth = harness.login("alice@example.com", "Wrong1!aa").await;
    assert_eq!(fifth.status(), StatusCode::LOCKED);
    let body: MessageResponse = read_json(fifth).await?;
    assert!(body.message.contains("5 failed login attempts"));
    assert!(body.message.contains("reset your password"));

    // Sixth attempt with the CORRECT password is still rejected as locked.
    let sixth = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(sixth.status(), StatusCode::LOCKED);

    // Exactly one lockout notice went out.
    let notices = harness
        .notifier
        .sent()
        .await
        .iter()
        .filter(|message| message.subject.contains("locked"))
        .count();
    assert_eq!(notices, 1);
    Ok(())
}

#[tokio::test]
async fn expired_lockout_clears_on_next_login_attempt() -> Result<()> {
    // Zero-minute window: the lockout expires immediately, so the next
    // check clears it lazily and the correct password goes through.
    let harness = Harness::with_config(
        AuthConfig::new("https://heredi.dev".to_string()).with_lockout_minutes(0),
    );
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    for _ in 0..5 {
        harness.login("alice@example.com", "Wrong1!aa").await;
    }

    let response = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(response.status(), StatusCode::OK);

    let account = harness
        .store
        .find_by_email("alice@example.com")
        .await?
        .context("account exists")?;
    assert!(!account.account_locked);
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.lockout_expiry.is_none());
    Ok(())
}

#[tokio::test]
async fn forgot_password_responses_are_byte_identical() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    let known = harness.forgot_password("alice@example.com").await;
    let unknown = harness.forgot_password("ghost@example.com").await;
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(read_bytes(known).await?, read_bytes(unknown).await?);
    Ok(())
}

#[tokio::test]
async fn forgot_password_missing_email_is_rejected() {
    let harness = Harness::new();
    let response = harness.forgot_password("  ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_password_send_failure_still_reports_success() -> Result<()> {
    let notifier = Arc::new(RecordingNotifier::failing());
    let auth_state = Arc::new(auth_state_with_notifier(notifier.clone()));
    let store = Arc::new(MemoryCredentialStore::new());
    let harness = Harness {
        store,
        auth_state,
        notifier,
    };
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    let response = harness.forgot_password("alice@example.com").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: MessageResponse = read_json(response).await?;
    assert!(body.success);
    Ok(())
}

#[tokio::test]
async fn lockout_then_reset_then_login_scenario() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    for attempt in 0..5 {
        let response = harness.login("alice@example.com", "Wrong1!aa").await;
        let expected = if attempt == 4 {
            StatusCode::LOCKED
        } else {
            StatusCode::UNAUTHORIZED
        };
        assert_eq!(response.status(), expected);
    }
    let locked = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(locked.status(), StatusCode::LOCKED);

    harness.forgot_password("alice@example.com").await;
    let token = harness
        .last_reset_token()
        .await
        .context("reset email should carry a token")?;

    let response = harness.reset_password(&token, "NewPass1!").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: MessageResponse = read_json(response).await?;
    assert!(body.message.contains("unlocked"));

    let account = harness
        .store
        .find_by_email("alice@example.com")
        .await?
        .context("account exists")?;
    assert!(!account.account_locked);
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.password_reset_token.is_none());

    // Old password no longer works; the new one yields a valid session.
    let old = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = harness.login("alice@example.com", "NewPass1!").await;
    assert_eq!(new.status(), StatusCode::OK);
    let body: LoginResponse = read_json(new).await?;
    let token = body.token.context("session token expected")?;
    let verified = harness.verify_session(Some(&token)).await;
    assert_eq!(verified.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn reset_token_is_single_use() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;
    harness.forgot_password("alice@example.com").await;
    let token = harness.last_reset_token().await.context("token expected")?;

    let first = harness.reset_password(&token, "NewPass1!").await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = harness.reset_password(&token, "Other1!aa").await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body: MessageResponse = read_json(second).await?;
    assert!(body.message.contains("Invalid or expired reset token"));
    Ok(())
}

#[tokio::test]
async fn reissuing_reset_token_invalidates_the_previous_one() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;

    harness.forgot_password("alice@example.com").await;
    let first = harness.last_reset_token().await.context("first token")?;
    harness.forgot_password("alice@example.com").await;
    let second = harness.last_reset_token().await.context("second token")?;
    assert_ne!(first, second);

    let stale = harness.reset_password(&first, "NewPass1!").await;
    assert_eq!(stale.status(), StatusCode::BAD_REQUEST);

    let fresh = harness.reset_password(&second, "NewPass1!").await;
    assert_eq!(fresh.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn reset_password_weak_password_rejected_without_consuming_token() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;
    harness.forgot_password("alice@example.com").await;
    let token = harness.last_reset_token().await.context("token expected")?;

    let weak = harness.reset_password(&token, "weak").await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);

    // The token survives the rejected attempt.
    let retry = harness.reset_password(&token, "NewPass1!").await;
    assert_eq!(retry.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn two_factor_login_flow() -> Result<()> {
    let harness = Harness::new();
    let created = harness
        .register("alice@example.com", "Aa1!aaaa", "Alice")
        .await;
    let created: SessionResponse = read_json(created).await?;
    let account_id = uuid::Uuid::parse_str(&created.user.id)?;
    harness
        .store
        .update(
            account_id,
            crate::store::AccountChanges {
                two_factor_enabled: Some(true),
                ..crate::store::AccountChanges::default()
            },
            Utc::now(),
        )
        .await?;

    let response = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = read_json(response).await?;
    assert_eq!(body.requires_2fa, Some(true));
    assert!(body.token.is_none(), "no session before the second factor");
    let user_id = body.user_id.context("userId expected")?;
    assert_eq!(user_id, account_id.to_string());
    let ticket = body.temp_token.context("tempToken expected")?;

    let code = harness
        .last_two_factor_code()
        .await
        .context("code email expected")?;

    let wrong = harness
        .verify_two_factor("alice@example.com", "000000", &ticket)
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let verified = harness
        .verify_two_factor("alice@example.com", &code, &ticket)
        .await;
    assert_eq!(verified.status(), StatusCode::OK);
    let body: SessionResponse = read_json(verified).await?;
    assert!(!body.token.is_empty());

    // The stored code is cleared on success and cannot be replayed.
    let account = harness
        .store
        .find_by_id(account_id)
        .await?
        .context("account exists")?;
    assert!(account.two_factor_code.is_none());
    assert!(account.two_factor_code_expiry.is_none());

    let replay = harness
        .verify_two_factor("alice@example.com", &code, &ticket)
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn two_factor_code_expiry_boundaries() -> Result<()> {
    let harness = Harness::new();
    let created = harness
        .register("alice@example.com", "Aa1!aaaa", "Alice")
        .await;
    let created: SessionResponse = read_json(created).await?;
    let account_id = uuid::Uuid::parse_str(&created.user.id)?;

    let now = Utc::now();
    let ticket = harness.auth_state.keys().mint_two_factor_ticket(
        account_id,
        "alice@example.com",
        Duration::minutes(10),
        now,
    )?;

    // One second of validity left: the correct code still verifies.
    harness
        .store
        .store_two_factor_code(account_id, "123456", now + Duration::seconds(1), now)
        .await?;
    let response = harness
        .verify_two_factor("alice@example.com", "123456", &ticket)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Expired one second ago: rejected and the stale code is cleared.
    harness
        .store
        .store_two_factor_code(account_id, "123456", now - Duration::seconds(1), now)
        .await?;
    let response = harness
        .verify_two_factor("alice@example.com", "123456", &ticket)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: MessageResponse = read_json(response).await?;
    assert!(body.message.contains("expired"));

    let account = harness
        .store
        .find_by_id(account_id)
        .await?
        .context("account exists")?;
    assert!(account.two_factor_code.is_none());
    Ok(())
}

#[tokio::test]
async fn two_factor_send_failure_still_reports_challenge() -> Result<()> {
    let notifier = Arc::new(RecordingNotifier::failing());
    let auth_state = Arc::new(auth_state_with_notifier(notifier.clone()));
    let store = Arc::new(MemoryCredentialStore::new());
    let harness = Harness {
        store,
        auth_state,
        notifier,
    };
    let created = harness
        .register("alice@example.com", "Aa1!aaaa", "Alice")
        .await;
    let created: SessionResponse = read_json(created).await?;
    harness
        .store
        .update(
            uuid::Uuid::parse_str(&created.user.id)?,
            crate::store::AccountChanges {
                two_factor_enabled: Some(true),
                ..crate::store::AccountChanges::default()
            },
            Utc::now(),
        )
        .await?;

    let response = harness.login("alice@example.com", "Aa1!aaaa").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = read_json(response).await?;
    assert_eq!(body.requires_2fa, Some(true));
    Ok(())
}

#[tokio::test]
async fn session_verify_rejects_deactivated_account() -> Result<()> {
    let harness = Harness::new();
    let created = harness
        .register("alice@example.com", "Aa1!aaaa", "Alice")
        .await;
    let created: SessionResponse = read_json(created).await?;
    let account_id = uuid::Uuid::parse_str(&created.user.id)?;

    let ok = harness.verify_session(Some(&created.token)).await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body: UserResponse = read_json(ok).await?;
    assert_eq!(body.user.email, "alice@example.com");

    harness.store.deactivate(account_id, Utc::now()).await?;
    let rejected = harness.verify_session(Some(&created.token)).await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_verify_rejects_missing_and_garbage_tokens() {
    let harness = Harness::new();
    let missing = harness.verify_session(None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let garbage = harness.verify_session(Some("not-a-token")).await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ticket_cannot_be_used_as_session_token() -> Result<()> {
    let harness = Harness::new();
    let created = harness
        .register("alice@example.com", "Aa1!aaaa", "Alice")
        .await;
    let created: SessionResponse = read_json(created).await?;
    let account_id = uuid::Uuid::parse_str(&created.user.id)?;

    let ticket = harness.auth_state.keys().mint_two_factor_ticket(
        account_id,
        "alice@example.com",
        Duration::minutes(10),
        Utc::now(),
    )?;
    let response = harness.verify_session(Some(&ticket)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn missing_payloads_are_bad_requests() {
    let harness = Harness::new();

    let response = register::register(harness.store_ext(), harness.state_ext(), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = login::login(harness.store_ext(), harness.state_ext(), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = reset::forgot_password(harness.store_ext(), harness.state_ext(), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = reset::reset_password(harness.store_ext(), harness.state_ext(), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = two_factor::verify_two_factor(harness.store_ext(), harness.state_ext(), None)
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validate_reset_token_is_read_only_until_expiry() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Aa1!aaaa", "Alice").await;
    harness.forgot_password("alice@example.com").await;
    let token = harness.last_reset_token().await.context("token expected")?;

    let now = Utc::now();
    let account = reset::validate_reset_token(&*harness.store, &token, now).await?;
    assert!(account.is_some(), "valid token should validate");

    // Validation does not consume: it still validates a second time.
    let account = reset::validate_reset_token(&*harness.store, &token, now).await?;
    assert!(account.is_some());

    // Past expiry, validation clears the token.
    let late = now + Duration::hours(2);
    let account = reset::validate_reset_token(&*harness.store, &token, late).await?;
    assert!(account.is_none());
    let stored = harness
        .store
        .find_by_email("alice@example.com")
        .await?
        .context("account exists")?;
    assert!(stored.password_reset_token.is_none());
    Ok(())
}
