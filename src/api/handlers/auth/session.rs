//! Bearer session verification.

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::token::TokenError;
use super::types::{respond_message, AuthUser, UserResponse};
use crate::store::CredentialStore;

#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Session is valid", body = UserResponse),
        (status = 401, description = "Missing, invalid, or expired token, or deactivated account", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    store: Extension<Arc<dyn CredentialStore>>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return respond_message(StatusCode::UNAUTHORIZED, "Missing bearer token");
    };

    let claims = match auth_state.keys().verify_session(&token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            return respond_message(StatusCode::UNAUTHORIZED, "Session expired")
        }
        Err(TokenError::Invalid) => {
            return respond_message(StatusCode::UNAUTHORIZED, "Invalid session token")
        }
    };

    let Ok(account_id) = claims.account_id() else {
        return respond_message(StatusCode::UNAUTHORIZED, "Invalid session token");
    };

    // Claims alone are never trusted: the account is re-fetched so a token
    // cannot outlive a deactivation.
    match store.find_by_id(account_id).await {
        Ok(Some(account)) if account.is_active => (
            StatusCode::OK,
            Json(UserResponse {
                success: true,
                message: "Session valid".to_string(),
                user: AuthUser::from(&account),
            }),
        )
            .into_response(),
        Ok(Some(_)) => respond_message(StatusCode::UNAUTHORIZED, "Account is deactivated"),
        Ok(None) => respond_message(StatusCode::UNAUTHORIZED, "Invalid session token"),
        Err(err) => {
            error!("Failed to load account for session verification: {err}");
            respond_message(StatusCode::INTERNAL_SERVER_ERROR, "Verification failed")
        }
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_token_reads_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn extract_bearer_token_accepts_lowercase_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_or_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
