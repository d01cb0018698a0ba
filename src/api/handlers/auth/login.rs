//! Login: lockout gate, password check, then session or 2FA challenge.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use super::lockout::{locked_message, record_failed_login};
use super::password::{verify_password, DUMMY_PASSWORD_HASH};
use super::state::AuthState;
use super::two_factor::issue_two_factor_code;
use super::types::{respond_message, AuthUser, LoginRequest, LoginResponse};
use super::utils::normalize_email;
use crate::store::{CredentialStore, LockoutCheck, StoreError};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued, or a 2FA challenge with userId and tempToken", body = LoginResponse),
        (status = 400, description = "Missing fields", body = super::types::MessageResponse),
        (status = 401, description = "Invalid credentials", body = super::types::MessageResponse),
        (status = 423, description = "Account locked", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return respond_message(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return respond_message(StatusCode::BAD_REQUEST, "Email and password are required");
    }

    let now = Utc::now();

    // Gate first: a locked account rejects with the distinct locked error even
    // for a correct password, so lockout never leaks whether it was right.
    let account = match store.check_lockout(&email, now).await {
        Ok(LockoutCheck::Clear(account)) => account,
        Ok(LockoutCheck::Locked { until: _ }) => {
            return respond_message(StatusCode::LOCKED, locked_message(&auth_state));
        }
        Ok(LockoutCheck::NotFound) => {
            // Burn a bcrypt verification so unknown emails cost the same as
            // wrong passwords.
            if let Err(err) = verify_password(&request.password, DUMMY_PASSWORD_HASH).await {
                error!("Dummy password verification failed: {err}");
            }
            return respond_message(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS);
        }
        Err(err) => {
            error!("Lockout check failed: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let password_matches = match verify_password(&request.password, &account.password_hash).await {
        Ok(matches) => matches,
        Err(err) => {
            error!("Password verification failed: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    if !password_matches {
        return match record_failed_login(&**store, &auth_state, &email, now).await {
            // The attempt that crossed the threshold already answers as locked.
            Ok(record) if record.account.account_locked => {
                respond_message(StatusCode::LOCKED, locked_message(&auth_state))
            }
            Ok(_) | Err(StoreError::NotFound) => {
                respond_message(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
            }
            Err(err) => {
                error!("Failed to record login failure: {err}");
                respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
            }
        };
    }

    if !account.is_active {
        debug!(email = %email, "login attempt against deactivated account");
        return respond_message(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS);
    }

    if account.two_factor_enabled {
        if let Err(err) = issue_two_factor_code(&**store, &auth_state, &account, now).await {
            error!("Failed to issue verification code: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }

        let ticket = match auth_state.keys().mint_two_factor_ticket(
            account.id,
            &account.email,
            auth_state.config().two_factor_ttl(),
            now,
        ) {
            Ok(ticket) => ticket,
            Err(err) => {
                error!("Failed to mint verification ticket: {err}");
                return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
            }
        };

        return (
            StatusCode::OK,
            Json(LoginResponse {
                success: true,
                message: "Verification code sent".to_string(),
                token: None,
                user: None,
                requires_2fa: Some(true),
                user_id: Some(account.id.to_string()),
                temp_token: Some(ticket),
            }),
        )
            .into_response();
    }

    if let Err(err) = store.record_success(&email, now).await {
        error!("Failed to reset failure state: {err}");
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
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            token: Some(token),
            user: Some(AuthUser::from(&*account)),
            requires_2fa: None,
            user_id: None,
            temp_token: None,
        }),
    )
        .into_response()
}
