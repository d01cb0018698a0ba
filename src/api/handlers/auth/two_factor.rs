//! Second-factor code issuance and verification.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::token::TokenError;
use super::types::{respond_message, AuthUser, SessionResponse, VerifyTwoFactorRequest};
use super::utils::{constant_time_eq, generate_two_factor_code, normalize_email};
use crate::api::notify::EmailMessage;
use crate::store::{Account, CredentialStore, StoreError};

/// Generate a fresh code, store it with its expiry, and email it.
///
/// Delivery is best-effort: a failed send is logged and the pending state
/// stands, so the caller still reports the 2FA challenge and the user can
/// retry the login to get a new code.
pub(super) async fn issue_two_factor_code(
    store: &dyn CredentialStore,
    auth_state: &AuthState,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let code = generate_two_factor_code();
    let expires_at = now + auth_state.config().two_factor_ttl();
    store
        .store_two_factor_code(account.id, &code, expires_at, now)
        .await?;

    let ttl_minutes = auth_state.config().two_factor_ttl().num_minutes();
    let text = format!(
        "Your verification code is {code}. It expires in {ttl_minutes} minutes."
    );
    let outcome = auth_state
        .notifier()
        .send(&EmailMessage {
            to: account.email.clone(),
            subject: "Your verification code".to_string(),
            html: format!("<p>{text}</p>"),
            text,
        })
        .await;
    if !outcome.success {
        error!(
            email = %account.email,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "failed to send verification code"
        );
    }

    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-2fa",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Second factor verified", body = SessionResponse),
        (status = 400, description = "Missing fields", body = super::types::MessageResponse),
        (status = 401, description = "Invalid or expired code or ticket", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_two_factor(
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyTwoFactorRequest>>,
) -> impl IntoResponse {
    let request: VerifyTwoFactorRequest = match payload {
        Some(Json(payload)) => payload,
        None => return respond_message(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    let submitted_code = request.verification_code.trim();
    if email.is_empty() || submitted_code.is_empty() || request.temp_token.trim().is_empty() {
        return respond_message(
            StatusCode::BAD_REQUEST,
            "Email, verification code, and token are required",
        );
    }

    // The ticket only identifies the pending login; the code itself is
    // checked against the account's stored state below.
    let claims = match auth_state.keys().verify_two_factor_ticket(request.temp_token.trim()) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return respond_message(StatusCode::UNAUTHORIZED, "Verification session expired")
        }
        Err(TokenError::Invalid) => {
            return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification session")
        }
    };

    if claims.email != email {
        return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification session");
    }

    let Ok(account_id) = claims.account_id() else {
        return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification session");
    };

    let account = match store.find_by_id(account_id).await {
        Ok(Some(account)) if account.is_active && account.email == email => account,
        Ok(_) => return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification session"),
        Err(err) => {
            error!("Failed to load account for 2FA verification: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed");
        }
    };

    let now = Utc::now();
    let Some(stored_code) = account.two_factor_code.as_deref() else {
        return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification code");
    };

    let expired = match account.two_factor_code_expiry {
        Some(expiry) => now > expiry,
        None => true,
    };
    if expired {
        if let Err(err) = store.clear_two_factor_code(account.id, now).await {
            error!("Failed to clear expired verification code: {err}");
        }
        return respond_message(StatusCode::UNAUTHORIZED, "Verification code expired");
    }

    if !constant_time_eq(stored_code.as_bytes(), submitted_code.as_bytes()) {
        return respond_message(StatusCode::UNAUTHORIZED, "Invalid verification code");
    }

    // One-time use: the code is cleared before the session is minted.
    if let Err(err) = store.clear_two_factor_code(account.id, now).await {
        error!("Failed to clear verification code: {err}");
        return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed");
    }
    if let Err(err) = store.record_success(&account.email, now).await {
        error!("Failed to reset failure state after 2FA: {err}");
    }

    let token = match auth_state.keys().mint_session(
        account.id,
        &account.email,
        auth_state.config().session_ttl(),
        now,
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint session token: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed");
        }
    };

    (
        StatusCode::OK,
        Json(SessionResponse {
            success: true,
            message: "Login successful".to_string(),
            token,
            user: AuthUser::from(&account),
        }),
    )
        .into_response()
}
