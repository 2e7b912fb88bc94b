//! HTTP + WebSocket client for the chat gateway.

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::ClientError;
use crate::objects::UserProfile;
use crate::objects::gateway::{
    ConnectRequest, GatewayErrorBody, GatewayMessage, GatewayUpdate, PasswordRequest,
    PasswordResponse, ResolvedEntity, SESSION_HEADER, SendCodeRequest, SendCodeResponse,
    SessionStatus, SignInRequest, SignInResponse,
};

/// Typed client for one gateway session.
///
/// Every request carries the session label in the `Hawk-Session` header, so
/// one gateway process can host the monitor session and any number of
/// onboarding sessions side by side.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    session: String,
}

impl GatewayClient {
    /// Create a new `GatewayClient`.
    ///
    /// * `base_url` – root URL of the gateway (e.g. `http://127.0.0.1:8081`).
    /// * `session` – session label; the gateway persists the session under it.
    pub fn new(base_url: Url, session: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            session: session.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// `POST /v1/session/connect`
    pub async fn connect(&self, request: &ConnectRequest) -> Result<SessionStatus, ClientError> {
        let url = self.base_url.join("/v1/session/connect")?;
        send_json(self.http.post(url).json(request), &self.session).await
    }

    /// `POST /v1/session/disconnect`
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let url = self.base_url.join("/v1/session/disconnect")?;
        send_empty(self.http.post(url), &self.session).await
    }

    /// `GET /v1/session/status`
    pub async fn status(&self) -> Result<SessionStatus, ClientError> {
        let url = self.base_url.join("/v1/session/status")?;
        send_json(self.http.get(url), &self.session).await
    }

    /// `POST /v1/auth/send-code`
    pub async fn send_code(&self, phone: &str) -> Result<SendCodeResponse, ClientError> {
        let url = self.base_url.join("/v1/auth/send-code")?;
        let body = SendCodeRequest {
            phone: phone.to_owned(),
        };
        send_json(self.http.post(url).json(&body), &self.session).await
    }

    /// `POST /v1/auth/sign-in`
    pub async fn sign_in(&self, request: &SignInRequest) -> Result<SignInResponse, ClientError> {
        let url = self.base_url.join("/v1/auth/sign-in")?;
        send_json(self.http.post(url).json(request), &self.session).await
    }

    /// `POST /v1/auth/password` – completes a two-step sign-in.
    pub async fn check_password(&self, password: &str) -> Result<UserProfile, ClientError> {
        let url = self.base_url.join("/v1/auth/password")?;
        let body = PasswordRequest {
            password: password.to_owned(),
        };
        let response: PasswordResponse =
            send_json(self.http.post(url).json(&body), &self.session).await?;
        Ok(response.user)
    }

    /// `GET /v1/me`
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let url = self.base_url.join("/v1/me")?;
        send_json(self.http.get(url), &self.session).await
    }

    /// `GET /v1/entities/{handle}`
    pub async fn resolve(&self, handle: &str) -> Result<ResolvedEntity, ClientError> {
        let path = format!("/v1/entities/{}", urlencoding::encode(handle));
        let url = self.base_url.join(&path)?;
        send_json(self.http.get(url), &self.session).await
    }

    /// `GET /v1/chats/{chat_id}/messages?limit=N` – newest first.
    pub async fn messages(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<GatewayMessage>, ClientError> {
        let url = self
            .base_url
            .join(&format!("/v1/chats/{chat_id}/messages"))?;
        let request = self.http.get(url).query(&[("limit", limit)]);
        send_json(request, &self.session).await
    }

    /// `GET /v1/chats/{chat_id}/messages/{message_id}`. A 404 is `None`.
    pub async fn message(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Option<GatewayMessage>, ClientError> {
        let url = self
            .base_url
            .join(&format!("/v1/chats/{chat_id}/messages/{message_id}"))?;
        match send_json(self.http.get(url), &self.session).await {
            Ok(message) => Ok(Some(message)),
            Err(ClientError::Api { status, .. } | ClientError::UnexpectedStatus { status, .. })
                if status == StatusCode::NOT_FOUND =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `GET /v1/dialogs?limit=1` – the cheapest authenticated request.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let url = self.base_url.join("/v1/dialogs")?;
        send_empty(self.http.get(url).query(&[("limit", 1)]), &self.session).await
    }

    /// Open the `WS /v1/updates` stream.
    pub async fn updates(&self) -> Result<GatewayUpdates, ClientError> {
        let mut url = self.base_url.join("/v1/updates")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Url(url::ParseError::RelativeUrlWithoutBase))?;

        let mut request = url.as_str().into_client_request()?;
        let session =
            HeaderValue::from_str(&self.session).map_err(|_| ClientError::InvalidSession)?;
        request.headers_mut().insert(SESSION_HEADER, session);

        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(GatewayUpdates { stream })
    }
}

/// The live updates stream of one gateway session.
pub struct GatewayUpdates {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl GatewayUpdates {
    /// Next update frame. `None` once the gateway closes the stream.
    ///
    /// Control frames are skipped. A frame that fails to parse is returned as
    /// an error so the caller can log it and keep reading.
    pub async fn next(&mut self) -> Option<Result<GatewayUpdate, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame {
                Message::Text(text) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::Json));
                }
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }
}

async fn send_json<T: serde::de::DeserializeOwned>(
    request: RequestBuilder,
    session: &str,
) -> Result<T, ClientError> {
    let response = request.header(SESSION_HEADER, session).send().await?;
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}

async fn send_empty(request: RequestBuilder, session: &str) -> Result<(), ClientError> {
    let response = request.header(SESSION_HEADER, session).send().await?;
    check_status(response).await?;
    Ok(())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<GatewayErrorBody>(&body) {
        Ok(body) => Err(ClientError::Api { status, body }),
        Err(_) => Err(ClientError::UnexpectedStatus { status, body }),
    }
}
