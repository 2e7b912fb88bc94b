//! Account onboarding handlers.
//!
//! Two-call login for additional accounts: `connect` sends a login code,
//! `verify-code` submits it, and `verify-password` finishes accounts with
//! two-step verification. Once an account is authorized its gateway session
//! is released; the login stays stored under its session label.

use axum::{Json, extract::State};
use hawk_sdk::objects::{
    ConnectApiRequest, ConnectApiResponse, VerifyCodeRequest, VerifyCodeResponse,
    VerifyPasswordRequest,
};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `POST /api/v1/accounts/connect`
pub(super) async fn connect(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(request): Json<ConnectApiRequest>,
) -> Json<ConnectApiResponse> {
    let user_id = request.user_id.clone();
    let response = state.onboarding.connect_api(request).await;
    if response.success && response.phone_code_hash.is_none() {
        release(&state, &user_id).await;
    }
    Json(response)
}

/// `POST /api/v1/accounts/verify-code`
pub(super) async fn verify_code(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(request): Json<VerifyCodeRequest>,
) -> Json<VerifyCodeResponse> {
    let response = state
        .onboarding
        .verify_code(&request.user_id, &request.code)
        .await;
    if response.success {
        release(&state, &request.user_id).await;
    }
    Json(response)
}

/// `POST /api/v1/accounts/verify-password`
pub(super) async fn verify_password(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(request): Json<VerifyPasswordRequest>,
) -> Json<VerifyCodeResponse> {
    let response = state
        .onboarding
        .verify_password(&request.user_id, &request.password)
        .await;
    if response.success {
        release(&state, &request.user_id).await;
    }
    Json(response)
}

/// Disconnect the transport of a freshly onboarded account.
async fn release(state: &AppState, user_id: &str) {
    let Some(account) = state.onboarding.take_authorized(user_id).await else {
        return;
    };
    tracing::info!(
        user_id,
        account_id = account.user.id,
        username = ?account.user.username,
        session = %account.session_label,
        "Account onboarded"
    );
    if let Err(e) = account.transport.disconnect().await {
        tracing::warn!(user_id, session = %account.session_label, error = %e, "Failed to release onboarding session");
    }
}
