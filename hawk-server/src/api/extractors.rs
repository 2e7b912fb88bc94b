//! Custom Axum extractors for request authentication.
//!
//! Provides `AdminAuth`, which checks the `Hawk-Admin-Authorization` header
//! against the argon2 hash of the admin secret. Used by the observer stream
//! and the account onboarding endpoints.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use hawk_sdk::signature::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Proof that the request carried the admin secret.
pub struct AdminAuth;

/// Errors returned by the [`AdminAuth`] extractor.
#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidHeader,
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Hawk-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (StatusCode::BAD_REQUEST, "invalid header format"),
            AdminAuthError::InvalidSecret => (StatusCode::UNAUTHORIZED, "invalid admin secret"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        let verified = state.admin.read().await.admits(secret);

        if verified {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected request with invalid admin secret");
            Err(AdminAuthError::InvalidSecret)
        }
    }
}
