//! KeepAlive processor.
//!
//! Issues a cheap request every `keep_alive_interval` so that a silently
//! dropped connection is noticed. Transient failures are logged; rate limits
//! and dead connections are reported to the supervisor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::{TaskFault, TaskFaultSender};
use crate::transport::ChatTransport;

const TASK: &str = "keep_alive";

pub struct KeepAlive {
    transport: Arc<dyn ChatTransport>,
    fault_tx: TaskFaultSender,
    interval: Duration,
}

impl KeepAlive {
    pub fn new(transport: Arc<dyn ChatTransport>, fault_tx: TaskFaultSender, interval: Duration) -> Self {
        Self {
            transport,
            fault_tx,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "KeepAlive started");
        // The connection was just used by the start sequence; first ping after one interval.
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("KeepAlive received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.transport.ping().await {
                        Ok(()) => debug!("Keep-alive ping ok"),
                        Err(e) if e.flood_wait().is_some() || e.is_fatal() => {
                            warn!(error = %e, "Keep-alive ping failed");
                            let _ = self.fault_tx.send(TaskFault::from_error(TASK, e)).await;
                            break;
                        }
                        Err(e) => warn!(error = %e, "Keep-alive ping failed, will retry"),
                    }
                }
            }
        }

        info!("KeepAlive shutdown complete");
    }
}
