//! Request and response bodies of the programmatic account onboarding flow.

use serde::{Deserialize, Serialize};

/// Starts onboarding of an additional account for `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectApiRequest {
    pub api_id: i32,
    pub api_hash: String,
    pub phone_number: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_code_hash: Option<String>,
}

impl ConnectApiResponse {
    pub fn code_sent(phone_code_hash: String) -> Self {
        Self {
            success: true,
            message: "Verification code sent to your phone".to_string(),
            phone_code_hash: Some(phone_code_hash),
        }
    }

    /// The session label was already logged in; no code is needed.
    pub fn already_authorized() -> Self {
        Self {
            success: true,
            message: "Account is already authorized".to_string(),
            phone_code_hash: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            phone_code_hash: None,
        }
    }
}

/// Submits the login code sent by [`ConnectApiRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub user_id: String,
    pub code: String,
}

/// Completes a pending two-step login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPasswordRequest {
    pub user_id: String,
    pub password: String,
}

/// Result of submitting a login code (or a two-step password).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub message: String,
    /// Set when the account has two-step verification and the request is
    /// waiting for a password.
    #[serde(default)]
    pub password_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl VerifyCodeResponse {
    pub fn connected(user: UserProfile) -> Self {
        Self {
            success: true,
            message: "Successfully connected to Telegram".to_string(),
            password_required: false,
            user: Some(user),
        }
    }

    pub fn password_required() -> Self {
        Self {
            success: false,
            message: "Two-step verification required".to_string(),
            password_required: true,
            user: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            password_required: false,
            user: None,
        }
    }
}

/// The authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}
