//! Password-reset token lifecycle and endpoints.
//!
//! Tokens are high-entropy, single-use, and stored only as hashes. Issuance
//! is enumeration-silent: unknown emails and delivery failures both produce
//! the same generic success response.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

use super::password::{hash_password, validate_password_policy};
use super::state::AuthState;
use super::types::{respond_message, ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{build_reset_url, generate_reset_token, hash_reset_token, normalize_email};
use crate::api::notify::EmailMessage;
use crate::store::{Account, CredentialStore, StoreError};

const GENERIC_FORGOT_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

/// Issue a reset token for the account, overwriting any outstanding one.
///
/// Returns `None` silently when the email is unknown; callers still report
/// generic success to the end user.
pub(super) async fn issue_reset_token(
    store: &dyn CredentialStore,
    auth_state: &AuthState,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, StoreError> {
    let Some(account) = store.find_by_email(email).await? else {
        return Ok(None);
    };

    let token = generate_reset_token().map_err(StoreError::Backend)?;
    let expires_at = now + auth_state.config().reset_token_ttl();
    store
        .store_reset_token(account.id, &hash_reset_token(&token), expires_at, now)
        .await?;
    Ok(Some(token))
}

/// Read-only token check for UI state; clears the token when it has expired
/// but does not consume a valid one.
pub(super) async fn validate_reset_token(
    store: &dyn CredentialStore,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Account>, StoreError> {
    let token_hash = hash_reset_token(token);
    let Some(account) = store.find_by_reset_token(&token_hash).await? else {
        return Ok(None);
    };

    let valid = matches!(account.password_reset_expiry, Some(expiry) if now < expiry);
    if !valid {
        store.clear_reset_token(account.id, now).await?;
        return Ok(None);
    }
    Ok(Some(account))
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic success, sent whether or not the email exists", body = super::types::MessageResponse),
        (status = 400, description = "Missing email", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return respond_message(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() {
        return respond_message(StatusCode::BAD_REQUEST, "Email is required");
    }

    let now = Utc::now();
    match issue_reset_token(&**store, &auth_state, &email, now).await {
        Ok(Some(token)) => {
            // Delivery failures stay invisible to the caller; the token is
            // already stored and a retry will reissue it.
            let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
            let ttl_minutes = auth_state.config().reset_token_ttl().num_minutes();
            let text = format!(
                "Reset your password within {ttl_minutes} minutes using this link: {reset_url}"
            );
            let outcome = auth_state
                .notifier()
                .send(&EmailMessage {
                    to: email.clone(),
                    subject: "Reset your password".to_string(),
                    html: format!("<p>{text}</p>"),
                    text,
                })
                .await;
            if !outcome.success {
                error!(
                    email = %email,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "failed to send password reset email"
                );
            }
            respond_message(StatusCode::OK, GENERIC_FORGOT_MESSAGE)
        }
        Ok(None) => respond_message(StatusCode::OK, GENERIC_FORGOT_MESSAGE),
        Err(err) => {
            error!("Failed to issue reset token: {err}");
            respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Password reset failed")
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, account unlocked", body = super::types::MessageResponse),
        (status = 400, description = "Weak password or invalid/expired token", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return respond_message(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return respond_message(StatusCode::BAD_REQUEST, "Reset token is required");
    }
    if let Err(err) = validate_password_policy(&request.new_password) {
        return respond_message(StatusCode::BAD_REQUEST, err.to_string());
    }

    let new_password_hash =
        match hash_password(&request.new_password, auth_state.config().bcrypt_cost()).await {
            Ok(hash) => hash,
            Err(err) => {
                error!("Failed to hash new password: {err}");
                return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Password reset failed");
            }
        };

    let now = Utc::now();
    match store
        .consume_reset_token(&hash_reset_token(token), &new_password_hash, now)
        .await
    {
        Ok(Some(_account)) => respond_message(
            StatusCode::OK,
            "Password reset successful. Your account is unlocked and you can now log in with your new password.",
        ),
        Ok(None) => respond_message(StatusCode::BAD_REQUEST, "Invalid or expired reset token"),
        Err(err) => {
            error!("Failed to consume reset token: {err}");
            respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Password reset failed")
        }
    }
}
