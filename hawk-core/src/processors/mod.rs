//! Long-running tasks of the monitoring engine.
//!
//! - `MonitorSupervisor`: owns the connection, spawns the three transport
//!   tasks below and restarts them after rate limits or disconnects
//! - `LiveEventHandler`: update stream -> `DetectionPipeline` (live)
//! - `HistoryScanner`: periodic re-scan -> `DetectionPipeline` (replay)
//! - `KeepAlive`: periodic ping, reports dead connections
//! - `TokenDispatcher`: receives `Detection`, persists, notifies, trades
//! - `SourceSync`: reconciles the registry with the reloaded source list

pub mod dispatcher;
pub mod history_scanner;
pub mod keep_alive;
pub mod live_handler;
pub mod pipeline;
pub mod source_sync;
pub mod supervisor;

pub use dispatcher::{ActionOutcome, DispatchOutcome, TokenDispatcher};
pub use history_scanner::{HistoryScanner, ScanReport};
pub use keep_alive::KeepAlive;
pub use live_handler::LiveEventHandler;
pub use pipeline::{DetectionPipeline, SourcedMessage};
pub use source_sync::{SourceSync, SyncReport};
pub use supervisor::{MAX_RECONNECT_ATTEMPTS, MonitorError, MonitorSupervisor};
