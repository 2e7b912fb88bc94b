use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use hawk_core::events::NotificationReceiver;
use hawk_sdk::objects::ws::{WsCloseCode, WsServerMessage};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// `GET /ws/contracts` — real-time detection stream.
///
/// Upgrades the HTTP connection to a WebSocket and pushes one
/// [`WsServerMessage::Contract`] frame per detection. The subscription is
/// taken before the upgrade completes; nothing published earlier is replayed.
pub(super) async fn contracts_ws(
    State(state): State<AppState>,
    _admin: AdminAuth,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let events = state.notifications.subscribe();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| relay_contracts(socket, events, shutdown))
}

/// Background task that drives a single observer connection until the
/// client leaves, the hub closes, or the server shuts down.
async fn relay_contracts(
    mut socket: WebSocket,
    mut events: NotificationReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("WS: observer connected");

    loop {
        tokio::select! {
            _ = stopping(&mut shutdown) => {
                close(&mut socket, WsCloseCode::NORMAL, "server shutting down").await;
                return;
            }

            result = events.recv() => {
                let msg = match result {
                    Ok(event) => WsServerMessage::Contract(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WS: observer lagged, skipping missed detections");
                        WsServerMessage::Lagged { skipped }
                    }
                    Err(RecvError::Closed) => {
                        let _ = send_json(
                            &mut socket,
                            &WsServerMessage::Error {
                                code: WsCloseCode::INTERNAL_ERROR,
                                reason: "detection stream closed".into(),
                            },
                        )
                        .await;
                        close(&mut socket, WsCloseCode::INTERNAL_ERROR, "detection stream closed").await;
                        return;
                    }
                };
                if send_json(&mut socket, &msg).await.is_err() {
                    return;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        tracing::debug!("WS: observer disconnected");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
