//! Event type definitions.

use hawk_sdk::objects::Delivery;

use crate::address::ContractAddress;
use crate::transport::TransportError;

/// An address sighting on its way to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub address: ContractAddress,
    /// Display name of the source it was found in.
    pub source_name: String,
    pub delivery: Delivery,
    pub detected_at: time::OffsetDateTime,
    /// `true` only for the sighting that passed the dedup gate. Repeats are
    /// shown to observers and go no further.
    pub first_seen: bool,
}

/// A transport task hit something it cannot handle on its own.
#[derive(Debug, Clone)]
pub struct TaskFault {
    pub task: &'static str,
    pub kind: FaultKind,
}

#[derive(Debug, Clone)]
pub enum FaultKind {
    /// All transport calls must stop for `seconds`.
    RateLimited { seconds: u64 },
    /// The update stream ended.
    StreamClosed,
    /// The connection is unusable.
    Fatal(TransportError),
}

impl TaskFault {
    pub fn from_error(task: &'static str, error: TransportError) -> Self {
        let kind = match error.flood_wait() {
            Some(seconds) => FaultKind::RateLimited { seconds },
            None => FaultKind::Fatal(error),
        };
        Self { task, kind }
    }
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FaultKind::RateLimited { seconds } => {
                write!(f, "{}: rate limited for {seconds}s", self.task)
            }
            FaultKind::StreamClosed => write!(f, "{}: update stream closed", self.task),
            FaultKind::Fatal(e) => write!(f, "{}: {e}", self.task),
        }
    }
}
