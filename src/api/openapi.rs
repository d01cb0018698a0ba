//! OpenAPI document for the served routes.

use utoipa::OpenApi;

use super::handlers::auth::types::{
    AuthUser, ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, ResetPasswordRequest, SessionResponse, UserResponse, VerifyTwoFactorRequest,
};
use super::handlers::health::Health;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health,
        crate::api::handlers::auth::register::register,
        crate::api::handlers::auth::login::login,
        crate::api::handlers::auth::two_factor::verify_two_factor,
        crate::api::handlers::auth::session::verify,
        crate::api::handlers::auth::reset::forgot_password,
        crate::api::handlers::auth::reset::reset_password,
    ),
    components(schemas(
        AuthUser,
        ForgotPasswordRequest,
        Health,
        LoginRequest,
        LoginResponse,
        MessageResponse,
        RegisterRequest,
        ResetPasswordRequest,
        SessionResponse,
        UserResponse,
        VerifyTwoFactorRequest,
    )),
    tags(
        (name = "auth", description = "Account authentication and lifecycle"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
