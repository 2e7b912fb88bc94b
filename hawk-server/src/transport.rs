//! [`ChatTransport`] backed by the chat gateway.
//!
//! Gateway errors are translated into [`TransportError`] here so the engine
//! only ever sees typed rate limits, login failures and disconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hawk_core::message::{ForwardRef, IncomingMessage, MessageEntity, MessageMedia};
use hawk_core::transport::{
    ApiCredentials, ChatEntity, ChatTransport, SignInOutcome, TransportError, TransportFactory,
    UpdateStream,
};
use hawk_sdk::client::{ClientError, GatewayClient};
use hawk_sdk::objects::UserProfile;
use hawk_sdk::objects::gateway::{
    ConnectRequest, FLOOD_WAIT, GatewayEntity, GatewayMedia, GatewayMessage, GatewayUpdate,
    ResolvedEntity, SignInRequest, SignInResponse,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Wait assumed when the gateway rate-limits without saying for how long.
const DEFAULT_FLOOD_WAIT_SECS: u64 = 60;

const UPDATE_BUFFER: usize = 256;

pub struct GatewayTransport {
    client: GatewayClient,
    credentials: Option<ApiCredentials>,
    connected: Arc<AtomicBool>,
}

impl GatewayTransport {
    /// `credentials` are sent on connect; a session that already exists in the
    /// gateway does not need them.
    pub fn new(client: GatewayClient, credentials: Option<ApiCredentials>) -> Self {
        Self {
            client,
            credentials,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn fail(&self, error: ClientError) -> TransportError {
        let error = map_client_error(error);
        if error.is_fatal() {
            self.connected.store(false, Ordering::SeqCst);
        }
        error
    }
}

#[async_trait]
impl ChatTransport for GatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let request = ConnectRequest {
            api_id: self.credentials.as_ref().map(|c| c.api_id),
            api_hash: self.credentials.as_ref().map(|c| c.api_hash.clone()),
        };
        let status = self
            .client
            .connect(&request)
            .await
            .map_err(|e| self.fail(e))?;
        self.connected.store(status.connected, Ordering::SeqCst);
        if !status.connected {
            return Err(TransportError::Disconnected);
        }
        debug!(session = %self.client.session(), "Gateway session connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.client.disconnect().await.map_err(map_client_error)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        let status = self.client.status().await.map_err(|e| self.fail(e))?;
        Ok(status.authorized)
    }

    async fn send_code(&self, phone: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .send_code(phone)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(response.phone_code_hash)
    }

    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> Result<SignInOutcome, TransportError> {
        let request = SignInRequest {
            phone: phone.to_owned(),
            code: code.to_owned(),
            phone_code_hash: phone_code_hash.to_owned(),
        };
        match self.client.sign_in(&request).await.map_err(|e| self.fail(e))? {
            SignInResponse::Authorized { user } => Ok(SignInOutcome::Authorized(user)),
            SignInResponse::PasswordRequired => Ok(SignInOutcome::PasswordRequired),
        }
    }

    async fn check_password(&self, password: &str) -> Result<UserProfile, TransportError> {
        self.client
            .check_password(password)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn get_me(&self) -> Result<UserProfile, TransportError> {
        self.client.me().await.map_err(|e| self.fail(e))
    }

    async fn updates(&self) -> Result<UpdateStream, TransportError> {
        let mut updates = self.client.updates().await.map_err(|e| self.fail(e))?;
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let connected = self.connected.clone();
        let session = self.client.session().to_owned();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => break,
                    next = updates.next() => next,
                };
                let item = match next {
                    Some(Ok(GatewayUpdate::NewMessage { message })) => {
                        Ok(incoming_from_gateway(message))
                    }
                    Some(Ok(GatewayUpdate::Other)) => continue,
                    Some(Err(ClientError::Json(e))) => {
                        warn!(%session, error = %e, "Skipping undecodable update frame");
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(%session, error = %e, "Update stream failed");
                        connected.store(false, Ordering::SeqCst);
                        let _ = tx.send(Err(TransportError::Disconnected)).await;
                        break;
                    }
                    None => {
                        info!(%session, "Gateway closed the update stream");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn resolve_entity(&self, handle: &str) -> Result<ChatEntity, TransportError> {
        match self.client.resolve(handle).await {
            Ok(entity) => Ok(chat_entity(entity)),
            Err(ClientError::Api { status, .. } | ClientError::UnexpectedStatus { status, .. })
                if status == StatusCode::NOT_FOUND =>
            {
                Err(TransportError::InvalidHandle(handle.to_owned()))
            }
            Err(e) => match self.fail(e) {
                TransportError::InvalidHandle(_) => {
                    Err(TransportError::InvalidHandle(handle.to_owned()))
                }
                other => Err(other),
            },
        }
    }

    async fn recent_messages(
        &self,
        entity: &ChatEntity,
        limit: u32,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        let messages = self
            .client
            .messages(entity.id, limit)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(messages.into_iter().map(incoming_from_gateway).collect())
    }

    async fn get_message(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Option<IncomingMessage>, TransportError> {
        let message = self
            .client
            .message(chat_id, message_id)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(message.map(incoming_from_gateway))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.client.ping().await.map_err(|e| self.fail(e))
    }
}

/// Creates gateway transports for onboarding sessions.
pub struct GatewayTransportFactory {
    base_url: Url,
    http: reqwest::Client,
}

impl GatewayTransportFactory {
    pub fn new(base_url: Url, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }
}

#[async_trait]
impl TransportFactory for GatewayTransportFactory {
    async fn create(
        &self,
        credentials: &ApiCredentials,
        session_label: &str,
    ) -> Result<Arc<dyn ChatTransport>, TransportError> {
        let client = GatewayClient::new(self.base_url.clone(), session_label)
            .with_http_client(self.http.clone());
        Ok(Arc::new(GatewayTransport::new(
            client,
            Some(credentials.clone()),
        )))
    }
}

/// Translate a gateway failure into the engine's error vocabulary.
pub fn map_client_error(error: ClientError) -> TransportError {
    match error {
        ClientError::Api { status, body } => {
            let message = body.message.unwrap_or_else(|| body.error.clone());
            match body.error.as_str() {
                FLOOD_WAIT => TransportError::FloodWait {
                    seconds: body.seconds.unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
                },
                "PHONE_CODE_INVALID" | "PHONE_CODE_EXPIRED" | "PHONE_CODE_EMPTY" => {
                    TransportError::InvalidCode
                }
                "PASSWORD_HASH_INVALID" => TransportError::InvalidPassword,
                "USERNAME_INVALID" | "USERNAME_NOT_OCCUPIED" => {
                    TransportError::InvalidHandle(message)
                }
                "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" => TransportError::Unauthorized,
                "NOT_CONNECTED" => TransportError::Disconnected,
                _ if is_rate_limit_status(status) => TransportError::FloodWait {
                    seconds: body.seconds.unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
                },
                code => TransportError::Rpc {
                    code: code.to_owned(),
                    message,
                },
            }
        }
        ClientError::UnexpectedStatus { status, body } => {
            if is_rate_limit_status(status) {
                TransportError::FloodWait {
                    seconds: DEFAULT_FLOOD_WAIT_SECS,
                }
            } else if status == StatusCode::UNAUTHORIZED {
                TransportError::Unauthorized
            } else {
                TransportError::Rpc {
                    code: status.as_u16().to_string(),
                    message: body,
                }
            }
        }
        ClientError::Http(e) if e.is_connect() => TransportError::Disconnected,
        ClientError::WebSocket(_) => TransportError::Disconnected,
        other => TransportError::Other(other.to_string()),
    }
}

fn is_rate_limit_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420
}

fn chat_entity(entity: ResolvedEntity) -> ChatEntity {
    ChatEntity {
        id: entity.id,
        title: entity.title,
        username: entity.username,
    }
}

/// Convert a gateway message into the engine's message model.
pub fn incoming_from_gateway(message: GatewayMessage) -> IncomingMessage {
    let media = message.media.map(|media| match media {
        GatewayMedia::Webpage { url } => MessageMedia::WebpagePreview { url },
        GatewayMedia::Document { caption } | GatewayMedia::Photo { caption } => {
            MessageMedia::Captioned { caption }
        }
        GatewayMedia::Unsupported { raw_text } => MessageMedia::Unsupported { raw_text },
        GatewayMedia::Other => MessageMedia::Other,
    });
    let entities = message
        .entities
        .into_iter()
        .map(|entity| match entity {
            GatewayEntity::TextUrl { url } => MessageEntity::TextUrl { url },
            GatewayEntity::Other => MessageEntity::Other,
        })
        .collect();
    // Without an origin chat the forwarded id is looked up in this chat.
    let forward = message.forward.and_then(|fwd| {
        Some(ForwardRef {
            chat_id: fwd.chat_id.unwrap_or(message.chat_id),
            message_id: fwd.message_id?,
        })
    });

    IncomingMessage {
        id: message.id,
        chat_id: message.chat_id,
        sender_id: message.sender_id,
        text: message.text,
        media,
        entities,
        forward,
        date: message.date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawk_sdk::objects::gateway::{GatewayErrorBody, GatewayForward};

    fn api_error(status: u16, error: &str, seconds: Option<u64>) -> ClientError {
        ClientError::Api {
            status: StatusCode::from_u16(status).unwrap(),
            body: GatewayErrorBody {
                error: error.to_string(),
                seconds,
                message: None,
            },
        }
    }

    #[test]
    fn test_flood_wait_maps_with_seconds() {
        let err = map_client_error(api_error(420, FLOOD_WAIT, Some(37)));
        assert_eq!(err.flood_wait(), Some(37));

        let err = map_client_error(api_error(429, "SLOWMODE_WAIT", None));
        assert_eq!(err.flood_wait(), Some(DEFAULT_FLOOD_WAIT_SECS));
    }

    #[test]
    fn test_login_errors_map_to_typed_variants() {
        assert!(matches!(
            map_client_error(api_error(400, "PHONE_CODE_INVALID", None)),
            TransportError::InvalidCode
        ));
        assert!(matches!(
            map_client_error(api_error(400, "PASSWORD_HASH_INVALID", None)),
            TransportError::InvalidPassword
        ));
        assert!(matches!(
            map_client_error(api_error(401, "AUTH_KEY_UNREGISTERED", None)),
            TransportError::Unauthorized
        ));
        assert!(matches!(
            map_client_error(api_error(400, "CHAT_ADMIN_REQUIRED", None)),
            TransportError::Rpc { code, .. } if code == "CHAT_ADMIN_REQUIRED"
        ));
    }

    #[test]
    fn test_unparsed_error_statuses() {
        let err = map_client_error(ClientError::UnexpectedStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        });
        assert!(err.flood_wait().is_some());

        let err = map_client_error(ClientError::UnexpectedStatus {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream".to_string(),
        });
        assert!(matches!(err, TransportError::Rpc { code, .. } if code == "502"));
    }

    #[test]
    fn test_gateway_message_conversion() {
        let message = GatewayMessage {
            id: 9,
            chat_id: -1001,
            chat_title: Some("alpha calls".to_string()),
            sender_id: Some(5),
            text: String::new(),
            media: Some(GatewayMedia::Photo {
                caption: Some("look".to_string()),
            }),
            entities: vec![
                GatewayEntity::TextUrl {
                    url: "https://pump.fun/coin/x".to_string(),
                },
                GatewayEntity::Other,
            ],
            forward: Some(GatewayForward {
                chat_id: Some(-1002),
                message_id: Some(77),
            }),
            date: 1_730_000_000,
        };

        let incoming = incoming_from_gateway(message);
        assert_eq!(
            incoming.media,
            Some(MessageMedia::Captioned {
                caption: Some("look".to_string())
            })
        );
        assert_eq!(incoming.entities.len(), 2);
        assert_eq!(
            incoming.forward,
            Some(ForwardRef {
                chat_id: -1002,
                message_id: 77
            })
        );
    }

    #[test]
    fn test_forward_without_chat_falls_back_to_own_chat() {
        let message: GatewayMessage = serde_json::from_str(
            r#"{"id":1,"chat_id":-1001,"date":0,"forward":{"message_id":3}}"#,
        )
        .unwrap();
        assert_eq!(
            incoming_from_gateway(message).forward,
            Some(ForwardRef {
                chat_id: -1001,
                message_id: 3
            })
        );
    }

    #[test]
    fn test_forward_without_message_id_is_dropped() {
        let message: GatewayMessage = serde_json::from_str(
            r#"{"id":1,"chat_id":-1001,"date":0,"forward":{"chat_id":-2002}}"#,
        )
        .unwrap();
        assert!(incoming_from_gateway(message).forward.is_none());
    }

    #[test]
    fn test_new_transport_starts_disconnected() {
        let client = GatewayClient::new(Url::parse("http://127.0.0.1:1").unwrap(), "monitor");
        let transport = GatewayTransport::new(client, None);
        assert!(!transport.is_connected());
    }
}
