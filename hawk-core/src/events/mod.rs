//! Events flowing between the monitoring tasks.
//!
//! # Event Flow
//!
//! 1. `LiveEventHandler` / `HistoryScanner` run messages through the
//!    `DetectionPipeline`, which emits `Detection` -> `TokenDispatcher`
//! 2. `TokenDispatcher` publishes `ContractDetected` on the notification hub
//! 3. Transport tasks report `TaskFault` -> `MonitorSupervisor`
//!
//! Detections are only emitted after the dedup gate, so each address is sent
//! at most once per process.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, DEFAULT_NOTIFICATION_BUFFER, DetectionReceiver, DetectionSender,
    NotificationReceiver, NotificationSender, TaskFaultReceiver, TaskFaultSender,
    detection_channel, notification_channel, task_fault_channel,
};
pub use types::{Detection, FaultKind, TaskFault};
