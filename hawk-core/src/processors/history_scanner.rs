//! HistoryScanner processor.
//!
//! Every `history_interval` the scanner fetches the `history_limit` most recent
//! messages of each active, resolved source and feeds them through the
//! `DetectionPipeline` as replay deliveries. This catches messages missed while
//! a source was paused or the connection was being re-established.
//!
//! A failing source is logged and skipped; the cycle is repeated on the next
//! tick regardless. Rate limits and dead connections stop the scanner and are
//! reported to the supervisor.

use std::time::Duration;

use hawk_sdk::objects::Delivery;
use kanau::processor::Processor;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::pipeline::{DetectionPipeline, SourcedMessage};
use crate::events::{TaskFault, TaskFaultSender};
use crate::registry::SourceRegistry;
use crate::transport::ChatTransport;

const TASK: &str = "history";

/// Result of one scan cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub sources_scanned: usize,
    pub sources_failed: usize,
    pub messages: usize,
    pub detections: usize,
}

pub struct HistoryScanner {
    transport: Arc<dyn ChatTransport>,
    registry: SourceRegistry,
    pipeline: DetectionPipeline,
    fault_tx: TaskFaultSender,
    interval: Duration,
    limit: u32,
}

impl HistoryScanner {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        registry: SourceRegistry,
        pipeline: DetectionPipeline,
        fault_tx: TaskFaultSender,
        interval: Duration,
        limit: u32,
    ) -> Self {
        Self {
            transport,
            registry,
            pipeline,
            fault_tx,
            interval,
            limit,
        }
    }

    /// Scan immediately, then every interval, until shutdown or a fault.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), limit = self.limit, "HistoryScanner started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("HistoryScanner received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(report) => debug!(?report, "History scan complete"),
                        Err(fault) => {
                            warn!(%fault, "History scan aborted");
                            let _ = self.fault_tx.send(fault).await;
                            break;
                        }
                    }
                }
            }
        }

        info!("HistoryScanner shutdown complete");
    }

    /// Scan every active, resolved source once.
    pub async fn scan_once(&self) -> Result<ScanReport, TaskFault> {
        let mut report = ScanReport::default();

        for source in self.registry.active_resolved().await {
            let messages = match self
                .transport
                .recent_messages(&source.entity, self.limit)
                .await
            {
                Ok(messages) => messages,
                Err(e) if e.flood_wait().is_some() || e.is_fatal() => {
                    return Err(TaskFault::from_error(TASK, e));
                }
                Err(e) => {
                    warn!(source = %source.id, chat_id = source.entity.id, error = %e, "Failed to fetch recent messages");
                    report.sources_failed += 1;
                    continue;
                }
            };

            report.sources_scanned += 1;
            // Oldest first, the order they were posted in.
            for message in messages.into_iter().rev() {
                report.messages += 1;
                let input = SourcedMessage {
                    message,
                    source_name: source.name.clone(),
                    delivery: Delivery::Replay,
                };
                match self.pipeline.process(input).await {
                    Ok(emitted) => report.detections += emitted,
                    Err(never) => match never {},
                }
            }
        }

        Ok(report)
    }
}
