//! Real-time detection payloads pushed to observers.

use serde::{Deserialize, Serialize};

/// How a detection reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Seen on the real-time message stream. Eligible for the trade action.
    Live,
    /// Seen while re-scanning recent history. Recorded, never actioned.
    Replay,
}

impl Delivery {
    pub fn is_live(self) -> bool {
        matches!(self, Delivery::Live)
    }
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Live => write!(f, "live"),
            Delivery::Replay => write!(f, "replay"),
        }
    }
}

/// Payload of the `contract` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDetected {
    /// The contract address as it appeared in the message.
    pub contract: String,
    /// Display name of the source the message came from.
    pub group: String,
    /// Unix timestamp (seconds) of the delivery.
    pub timestamp: i64,
    pub delivery: Delivery,
}

impl ContractDetected {
    /// Event name used when the payload is emitted to observers.
    pub const EVENT_NAME: &str = "contract";
}
