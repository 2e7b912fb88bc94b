//! The seam between the monitoring engine and the chat network.
//!
//! Everything the engine needs from the network goes through [`ChatTransport`]:
//! connection state, the login handshake, entity lookup, bounded history, the
//! live update stream, and a cheap keep-alive request. The server crate backs
//! it with the gateway client; tests back it with a scripted in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;
use hawk_sdk::objects::UserProfile;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::IncomingMessage;

/// Stream of live messages. The sender side closing means the connection is gone.
pub type UpdateStream = mpsc::Receiver<Result<IncomingMessage, TransportError>>;

/// Errors surfaced by a [`ChatTransport`].
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The network asked us to back off. No call may be made for `seconds`.
    #[error("rate limited, must wait {seconds} seconds")]
    FloodWait { seconds: u64 },

    #[error("no chat or user found for handle {0:?}")]
    InvalidHandle(String),

    #[error("the login code is invalid or expired")]
    InvalidCode,

    #[error("the two-step verification password is invalid")]
    InvalidPassword,

    #[error("transport is not connected")]
    Disconnected,

    #[error("session is not authorized")]
    Unauthorized,

    /// Any other error the network answered with.
    #[error("rpc error {code}: {message}")]
    Rpc { code: String, message: String },

    /// Local failure (I/O, decoding) below the RPC layer.
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Wait mandated by the network, if this is a rate-limit error.
    pub fn flood_wait(&self) -> Option<u64> {
        match self {
            TransportError::FloodWait { seconds } => Some(*seconds),
            _ => None,
        }
    }

    /// Errors after which the connection cannot be used any more.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Disconnected | TransportError::Unauthorized
        )
    }
}

/// A resolved chat, channel, or user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatEntity {
    /// Stable chat id; messages from this chat carry it as `chat_id`.
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl ChatEntity {
    /// The best human readable name of this entity.
    pub fn display_name(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.username.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of submitting a login code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized(UserProfile),
    /// The account has two-step verification enabled.
    PasswordRequired,
}

/// Application credentials of the chat network API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// Capabilities the engine needs from the chat network.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn is_authorized(&self) -> Result<bool, TransportError>;

    /// Request a login code for `phone`. Returns the code hash to echo back.
    async fn send_code(&self, phone: &str) -> Result<String, TransportError>;

    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, TransportError>;

    async fn check_password(&self, password: &str) -> Result<UserProfile, TransportError>;

    async fn get_me(&self) -> Result<UserProfile, TransportError>;

    /// Subscribe to new messages from every chat the account can see.
    async fn updates(&self) -> Result<UpdateStream, TransportError>;

    async fn resolve_entity(&self, handle: &str) -> Result<ChatEntity, TransportError>;

    /// Up to `limit` most recent messages of `entity`, newest first.
    async fn recent_messages(
        &self,
        entity: &ChatEntity,
        limit: u32,
    ) -> Result<Vec<IncomingMessage>, TransportError>;

    async fn get_message(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Option<IncomingMessage>, TransportError>;

    /// Cheapest request that still round-trips to the network.
    async fn ping(&self) -> Result<(), TransportError>;
}

/// Creates fresh transports for onboarding additional accounts.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        credentials: &ApiCredentials,
        session_label: &str,
    ) -> Result<Arc<dyn ChatTransport>, TransportError>;
}
