//! HTTP API of the monitor.
//!
//! # Endpoints
//!
//! - `GET  /ws/contracts`                    – observer WebSocket stream
//! - `POST /api/v1/accounts/connect`         – start onboarding an account
//! - `POST /api/v1/accounts/verify-code`     – submit the login code
//! - `POST /api/v1/accounts/verify-password` – finish two-step verification
//!
//! Every endpoint requires the `Hawk-Admin-Authorization` header.

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod accounts;
mod contracts_ws;
pub mod extractors;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/contracts", get(contracts_ws::contracts_ws))
        .nest(
            "/api/v1/accounts",
            Router::new()
                .route("/connect", post(accounts::connect))
                .route("/verify-code", post(accounts::verify_code))
                .route("/verify-password", post(accounts::verify_password)),
        )
}
