//! Event channel factories and handles.

use hawk_sdk::objects::ContractDetected;
use tokio::sync::{broadcast, mpsc};

use super::types::{Detection, TaskFault};

/// Default buffer size for event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Buffer of the observer broadcast. Slow observers skip what falls out of it.
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 1024;

/// Sender handle for Detection events.
pub type DetectionSender = mpsc::Sender<Detection>;
/// Receiver handle for Detection events.
pub type DetectionReceiver = mpsc::Receiver<Detection>;

/// Sender handle for TaskFault events.
pub type TaskFaultSender = mpsc::Sender<TaskFault>;
/// Receiver handle for TaskFault events.
pub type TaskFaultReceiver = mpsc::Receiver<TaskFault>;

/// Publishing side of the observer hub.
pub type NotificationSender = broadcast::Sender<ContractDetected>;
/// One observer's subscription.
pub type NotificationReceiver = broadcast::Receiver<ContractDetected>;

/// Create a new Detection channel.
///
/// Multiple senders can be cloned from the returned sender; the live handler
/// and the history scanner share one.
pub fn detection_channel() -> (DetectionSender, DetectionReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new TaskFault channel.
pub fn task_fault_channel() -> (TaskFaultSender, TaskFaultReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the observer hub. Publishing with no subscriber is not an error.
pub fn notification_channel() -> NotificationSender {
    let (tx, _) = broadcast::channel(DEFAULT_NOTIFICATION_BUFFER);
    tx
}
