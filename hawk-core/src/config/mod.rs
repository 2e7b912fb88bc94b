//! Runtime settings of the monitoring engine.
//!
//! Loading and validation happen in the server crate; these are the
//! already-validated values the engine runs with.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use std::time::Duration;

use crate::address::ExtractionMode;

pub const DEFAULT_HISTORY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_HISTORY_LIMIT: u32 = 5;
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_DISPATCH_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Period of the history re-scan.
    pub history_interval: Duration,
    /// Messages fetched per source and scan.
    pub history_limit: u32,
    pub keep_alive_interval: Duration,
    pub extraction: ExtractionMode,
    /// How long in-flight dispatches may finish after shutdown.
    pub dispatch_grace: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            history_interval: DEFAULT_HISTORY_INTERVAL,
            history_limit: DEFAULT_HISTORY_LIMIT,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            extraction: ExtractionMode::default(),
            dispatch_grace: DEFAULT_DISPATCH_GRACE,
        }
    }
}

/// The handles that should be registered, as last read from the source list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub handles: Vec<String>,
}
