//! WebSocket message types for the observer stream.
//!
//! The `GET /ws/contracts` endpoint upgrades to a WebSocket connection and
//! pushes [`WsServerMessage`] JSON frames, one per detection. There is no
//! delivery guarantee: a client that falls behind receives a
//! [`WsServerMessage::Lagged`] frame and continues from the newest event.

use serde::{Deserialize, Serialize};

use super::contract::ContractDetected;

/// Server-to-client WebSocket message.
///
/// Serialized as an internally-tagged JSON object:
///
/// ```json
/// {"type":"contract","contract":"7xKX...","group":"alpha calls","timestamp":1730000000,"delivery":"live"}
/// {"type":"lagged","skipped":12}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// A contract address was detected.
    Contract(ContractDetected),

    /// The client was too slow and `skipped` events were dropped.
    Lagged { skipped: u64 },

    /// A server-side error. The server may send a close frame afterwards.
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close codes used by the observer stream.
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure, also sent when the server shuts down.
    pub const NORMAL: u16 = 1000;

    /// The detection stream broke on the server side.
    pub const INTERNAL_ERROR: u16 = 1011;
}
