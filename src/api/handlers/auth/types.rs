//! Request/response types for auth endpoints.
//!
//! Every response carries the `success`/`message` envelope; wire field names
//! are camelCase to match the public API contract.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::Account;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyTwoFactorRequest {
    pub email: String,
    #[serde(rename = "verificationCode")]
    pub verification_code: String,
    #[serde(rename = "tempToken")]
    pub temp_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

/// Public view of an account; never includes secret material.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "twoFactorEnabled")]
    pub two_factor_enabled: bool,
}

impl From<&Account> for AuthUser {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email.clone(),
            name: account.name.clone(),
            two_factor_enabled: account.two_factor_enabled,
        }
    }
}

/// Plain envelope for responses without a payload.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Envelope carrying a session token and the authenticated user.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: AuthUser,
}

/// Login either completes with a session or parks behind a 2FA challenge.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(rename = "requires2FA", skip_serializing_if = "Option::is_none")]
    pub requires_2fa: Option<bool>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "tempToken", skip_serializing_if = "Option::is_none")]
    pub temp_token: Option<String>,
}

/// Envelope for `GET /api/auth/verify`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub success: bool,
    pub message: String,
    pub user: AuthUser,
}

/// Build a plain envelope response with the given status.
pub(super) fn respond_message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(MessageResponse {
            success: status.is_success(),
            message: message.into(),
        }),
    )
        .into_response()
}
