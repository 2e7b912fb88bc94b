//! TokenDispatcher processor.
//!
//! The TokenDispatcher is responsible for:
//! - Receiving `Detection` events from the pipeline
//! - Persisting each first-seen discovery through the `DiscoveryStore` (idempotent on address)
//! - Publishing a `ContractDetected` notification for every sighting, repeats included
//! - Firing the `TradeAction` only for live deliveries whose record is new
//! - Recording the trade outcome as the contract status
//!
//! Each detection is dispatched on its own task so that a slow trade never
//! holds up the next detection. On shutdown in-flight dispatches get
//! `dispatch_grace` to finish and are abandoned after that.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hawk_sdk::objects::ContractDetected;
use kanau::processor::Processor;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::action::TradeAction;
use crate::entities::ContractStatus;
use crate::events::{Detection, DetectionReceiver, NotificationSender};
use crate::store::DiscoveryStore;

/// What happened to the trade action of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Replay delivery, known address, failed persistence, or no action configured.
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// `Some(true)` if this dispatch created the record. `None` if the store
    /// failed or was not consulted for a repeat sighting.
    pub inserted: Option<bool>,
    /// Observers that received the notification.
    pub notified: usize,
    pub action: ActionOutcome,
}

#[derive(Clone)]
pub struct TokenDispatcher {
    store: Arc<dyn DiscoveryStore>,
    notifier: NotificationSender,
    action: Option<Arc<dyn TradeAction>>,
    grace: Duration,
}

impl TokenDispatcher {
    pub fn new(store: Arc<dyn DiscoveryStore>, notifier: NotificationSender, grace: Duration) -> Self {
        Self {
            store,
            notifier,
            action: None,
            grace,
        }
    }

    /// Attach the downstream trade action.
    pub fn with_action(mut self, action: Arc<dyn TradeAction>) -> Self {
        self.action = Some(action);
        self
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut detection_rx: DetectionReceiver) {
        info!(trade_action = self.action.is_some(), "TokenDispatcher started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("TokenDispatcher received shutdown signal");
                        break;
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Dispatch task failed");
                    }
                }

                detection = detection_rx.recv() => {
                    let Some(detection) = detection else {
                        info!("Detection channel closed");
                        break;
                    };
                    let dispatcher = self.clone();
                    in_flight.spawn(async move {
                        let _ = dispatcher.process(detection).await;
                    });
                }
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), grace_secs = self.grace.as_secs(), "Waiting for in-flight dispatches");
            let drained = tokio::time::timeout(self.grace, async {
                while in_flight.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(abandoned = in_flight.len(), "Abandoning in-flight dispatches");
                in_flight.abort_all();
            }
        }

        info!("TokenDispatcher shutdown complete");
    }

    fn notify(&self, detection: &Detection) -> usize {
        let notification = ContractDetected {
            contract: detection.address.to_string(),
            group: detection.source_name.clone(),
            timestamp: detection.detected_at.unix_timestamp(),
            delivery: detection.delivery,
        };
        // No subscribers is fine.
        self.notifier.send(notification).unwrap_or(0)
    }

    async fn trade(&self, action: &dyn TradeAction, detection: &Detection) -> ActionOutcome {
        let address = detection.address.as_str();
        let (outcome, status) = match action.execute(detection).await {
            Ok(()) => {
                info!(address, source = %detection.source_name, "Trade action completed");
                (ActionOutcome::Succeeded, ContractStatus::Bought)
            }
            Err(e) => {
                error!(address, source = %detection.source_name, error = %e, "Trade action failed");
                (ActionOutcome::Failed, ContractStatus::BuyFailed)
            }
        };
        if let Err(e) = self.store.set_status(address, status).await {
            warn!(address, ?status, error = %e, "Failed to record trade outcome");
        }
        outcome
    }
}

impl Processor<Detection> for TokenDispatcher {
    type Output = DispatchOutcome;
    type Error = Infallible;

    async fn process(&self, detection: Detection) -> Result<DispatchOutcome, Infallible> {
        let address = detection.address.as_str();

        if !detection.first_seen {
            return Ok(DispatchOutcome {
                inserted: None,
                notified: self.notify(&detection),
                action: ActionOutcome::Skipped,
            });
        }

        let inserted = match self.store.upsert(&detection).await {
            Ok(outcome) => {
                debug!(address, inserted = outcome.inserted, id = outcome.record.id, "Discovery persisted");
                Some(outcome.inserted)
            }
            Err(e) => {
                error!(address, source = %detection.source_name, error = %e, "Failed to persist discovery");
                None
            }
        };

        let notified = self.notify(&detection);

        let action = match (&self.action, detection.delivery.is_live(), inserted) {
            (Some(action), true, Some(true)) => self.trade(action.as_ref(), &detection).await,
            _ => ActionOutcome::Skipped,
        };

        Ok(DispatchOutcome {
            inserted,
            notified,
            action,
        })
    }
}
