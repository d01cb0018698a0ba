//! Account registration.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use super::password::{hash_password, validate_password_policy};
use super::state::AuthState;
use super::types::{respond_message, AuthUser, RegisterRequest, SessionResponse};
use super::utils::{normalize_email, valid_email};
use crate::store::{CredentialStore, NewAccount, StoreError};

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Validation error", body = super::types::MessageResponse),
        (status = 409, description = "Account already exists", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return respond_message(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return respond_message(StatusCode::BAD_REQUEST, "Invalid email");
    }

    let name = request.name.trim();
    if name.is_empty() {
        return respond_message(StatusCode::BAD_REQUEST, "Name is required");
    }

    if let Err(err) = validate_password_policy(&request.password) {
        return respond_message(StatusCode::BAD_REQUEST, err.to_string());
    }

    let password_hash = match hash_password(&request.password, auth_state.config().bcrypt_cost()).await
    {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed");
        }
    };

    let now = Utc::now();
    let account = match store
        .create(
            NewAccount {
                email,
                name: name.to_string(),
                password_hash,
                two_factor_enabled: false,
            },
            now,
        )
        .await
    {
        Ok(account) => account,
        Err(StoreError::Conflict) => {
            return respond_message(
                StatusCode::CONFLICT,
                "An account with this email already exists",
            )
        }
        Err(err) => {
            error!("Failed to create account: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed");
        }
    };

    let token = match auth_state.keys().mint_session(
        account.id,
        &account.email,
        auth_state.config().session_ttl(),
        now,
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint session token: {err}");
            return respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Registration failed");
        }
    };

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            success: true,
            message: "Account created".to_string(),
            token,
            user: AuthUser::from(&account),
        }),
    )
        .into_response()
}
