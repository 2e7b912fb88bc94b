//! Typed client for the chat gateway.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod gateway;

pub use gateway::{GatewayClient, GatewayUpdates};

use reqwest::StatusCode;

use crate::objects::gateway::GatewayErrorBody;

/// Errors produced by the gateway client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a structured error body.
    #[error("gateway error: status {status}, {}", .body.error)]
    Api {
        status: StatusCode,
        body: GatewayErrorBody,
    },

    /// The gateway answered non-2xx without a parseable error body.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The session label is not a valid header value.
    #[error("invalid session label")]
    InvalidSession,

    /// The updates WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ClientError {
    /// The gateway's error name, if it sent one.
    pub fn rpc_name(&self) -> Option<&str> {
        match self {
            ClientError::Api { body, .. } => Some(body.error.as_str()),
            _ => None,
        }
    }
}
