//! Wire types of the chat gateway.
//!
//! The chat network is reached through an external gateway process that owns
//! the MTProto session. It answers JSON over HTTP and streams new messages over
//! a WebSocket as [`GatewayUpdate`] frames.

use serde::{Deserialize, Serialize};

use super::onboarding::UserProfile;

/// Header carrying the session label on every gateway request.
pub const SESSION_HEADER: &str = "Hawk-Session";

/// Error code the gateway uses for rate limiting.
pub const FLOOD_WAIT: &str = "FLOOD_WAIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Credentials are only needed the first time a session label is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCodeResponse {
    pub phone_code_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
    pub phone: String,
    pub code: String,
    pub phone_code_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignInResponse {
    Authorized { user: UserProfile },
    PasswordRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResponse {
    pub user: UserProfile,
}

/// A chat, channel, or user resolved from a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub id: i32,
    pub chat_id: i64,
    #[serde(default)]
    pub chat_title: Option<String>,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media: Option<GatewayMedia>,
    #[serde(default)]
    pub entities: Vec<GatewayEntity>,
    #[serde(default)]
    pub forward: Option<GatewayForward>,
    /// Unix timestamp (seconds).
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMedia {
    Webpage {
        #[serde(default)]
        url: Option<String>,
    },
    Document {
        #[serde(default)]
        caption: Option<String>,
    },
    Photo {
        #[serde(default)]
        caption: Option<String>,
    },
    Unsupported {
        #[serde(default)]
        raw_text: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEntity {
    TextUrl { url: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayForward {
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub message_id: Option<i32>,
}

/// A frame on the updates WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayUpdate {
    NewMessage { message: GatewayMessage },
    #[serde(other)]
    Other,
}

/// Error body returned with any non-2xx gateway response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    /// Upper-case RPC error name, e.g. `FLOOD_WAIT` or `PHONE_CODE_INVALID`.
    pub error: String,
    /// Mandatory wait for `FLOOD_WAIT`.
    #[serde(default)]
    pub seconds: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_media_and_updates_fall_back() {
        let media: GatewayMedia = serde_json::from_str(r#"{"type":"poll"}"#).unwrap();
        assert_eq!(media, GatewayMedia::Other);

        let update: GatewayUpdate =
            serde_json::from_str(r#"{"type":"user_typing","user_id":1}"#).unwrap();
        assert_eq!(update, GatewayUpdate::Other);
    }

    #[test]
    fn test_sign_in_response_variants() {
        let authorized: SignInResponse = serde_json::from_str(
            r#"{"status":"authorized","user":{"id":42,"username":"hawk"}}"#,
        )
        .unwrap();
        assert!(matches!(authorized, SignInResponse::Authorized { user } if user.id == 42));

        let password: SignInResponse =
            serde_json::from_str(r#"{"status":"password_required"}"#).unwrap();
        assert_eq!(password, SignInResponse::PasswordRequired);
    }

    #[test]
    fn test_sparse_message_defaults() {
        let msg: GatewayMessage =
            serde_json::from_str(r#"{"id":7,"chat_id":-1001,"date":1730000000}"#).unwrap();
        assert!(msg.text.is_empty());
        assert!(msg.media.is_none());
        assert!(msg.entities.is_empty());
    }
}
