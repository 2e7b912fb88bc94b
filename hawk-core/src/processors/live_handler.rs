//! LiveEventHandler processor.
//!
//! The LiveEventHandler is responsible for:
//! - Receiving messages from the transport's update stream
//! - Routing each message back to its registered source by chat id
//! - Dropping messages of unknown or paused sources before extraction
//! - Running the rest through the `DetectionPipeline` as live deliveries
//! - Reporting a broken stream to the supervisor as a `TaskFault`

use hawk_sdk::objects::Delivery;
use kanau::processor::Processor;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::pipeline::{DetectionPipeline, SourcedMessage};
use crate::events::{FaultKind, TaskFault, TaskFaultSender};
use crate::message::IncomingMessage;
use crate::registry::{SourceRegistry, SourceStatus};
use crate::transport::UpdateStream;

const TASK: &str = "live";

pub struct LiveEventHandler {
    registry: SourceRegistry,
    pipeline: DetectionPipeline,
    fault_tx: TaskFaultSender,
}

impl LiveEventHandler {
    pub fn new(
        registry: SourceRegistry,
        pipeline: DetectionPipeline,
        fault_tx: TaskFaultSender,
    ) -> Self {
        Self {
            registry,
            pipeline,
            fault_tx,
        }
    }

    /// Consume `updates` until shutdown or until the stream breaks.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut updates: UpdateStream) {
        info!("LiveEventHandler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("LiveEventHandler received shutdown signal");
                        break;
                    }
                }

                update = updates.recv() => {
                    match update {
                        Some(Ok(message)) => {
                            self.handle(message).await;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Update stream failed");
                            let _ = self.fault_tx.send(TaskFault::from_error(TASK, e)).await;
                            break;
                        }
                        None => {
                            warn!("Update stream closed");
                            let _ = self
                                .fault_tx
                                .send(TaskFault { task: TASK, kind: FaultKind::StreamClosed })
                                .await;
                            break;
                        }
                    }
                }
            }
        }

        info!("LiveEventHandler shutdown complete");
    }

    /// Route one message. Returns the number of detections emitted.
    pub async fn handle(&self, message: IncomingMessage) -> usize {
        let Some(source) = self.registry.lookup_by_chat(message.chat_id).await else {
            trace!(chat_id = message.chat_id, "Message from unmonitored chat");
            return 0;
        };
        if source.status != SourceStatus::Active {
            debug!(source = %source.id, message_id = message.id, "Dropping message of paused source");
            return 0;
        }

        debug!(source = %source.name, message_id = message.id, "Live message");
        let input = SourcedMessage {
            message,
            source_name: source.name,
            delivery: Delivery::Live,
        };
        match self.pipeline.process(input).await {
            Ok(emitted) => emitted,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::address::AddressExtractor;
    use crate::dedup::Deduplicator;
    use crate::events::{detection_channel, task_fault_channel};
    use crate::registry::{MonitoringSource, SourceId};
    use crate::testing::{MockTransport, PUMP, USDC, message};
    use crate::transport::ChatTransport;

    async fn setup() -> (
        Arc<MockTransport>,
        SourceRegistry,
        LiveEventHandler,
        crate::events::DetectionReceiver,
        crate::events::TaskFaultReceiver,
    ) {
        let transport = Arc::new(MockTransport::new());
        transport.add_entity("alpha", -1001, Some("Alpha Calls")).await;
        let registry = SourceRegistry::new(transport.clone());
        registry.add(MonitoringSource::active("alpha")).await.unwrap();
        registry.resolve(&SourceId::new("alpha")).await.unwrap();

        let (detection_tx, detection_rx) = detection_channel();
        let (fault_tx, fault_rx) = task_fault_channel();
        let pipeline = DetectionPipeline::new(
            transport.clone(),
            AddressExtractor::default(),
            Deduplicator::new(),
            detection_tx,
        );
        let handler = LiveEventHandler::new(registry.clone(), pipeline, fault_tx);
        (transport, registry, handler, detection_rx, fault_rx)
    }

    #[tokio::test]
    async fn test_routes_active_source() {
        let (_, _, handler, mut detections, _) = setup().await;
        assert_eq!(handler.handle(message(-1001, 1, PUMP)).await, 1);
        let d = detections.recv().await.unwrap();
        assert_eq!(d.source_name, "Alpha Calls");
        assert_eq!(d.delivery, Delivery::Live);
    }

    #[tokio::test]
    async fn test_unknown_chat_is_ignored() {
        let (_, _, handler, mut detections, _) = setup().await;
        assert_eq!(handler.handle(message(-9999, 1, PUMP)).await, 0);
        assert!(detections.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_paused_source_never_reaches_extraction() {
        let (_, registry, handler, mut detections, _) = setup().await;
        registry
            .set_status(&SourceId::new("alpha"), SourceStatus::Paused)
            .await
            .unwrap();
        assert_eq!(handler.handle(message(-1001, 1, PUMP)).await, 0);
        assert!(detections.try_recv().is_err());
        // Not marked either: a later live delivery still gets through.
        registry
            .set_status(&SourceId::new("alpha"), SourceStatus::Active)
            .await
            .unwrap();
        assert_eq!(handler.handle(message(-1001, 2, PUMP)).await, 1);
    }

    #[tokio::test]
    async fn test_run_consumes_stream_and_reports_close() {
        let (transport, _, handler, mut detections, mut faults) = setup().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let updates = transport.updates().await.unwrap();
        let task = tokio::spawn(handler.run(shutdown_rx, updates));

        transport.push_update(message(-1001, 5, &format!("{USDC} {PUMP}"))).await;
        assert_eq!(detections.recv().await.unwrap().address.as_str(), USDC);
        assert_eq!(detections.recv().await.unwrap().address.as_str(), PUMP);

        transport.close_updates().await;
        task.await.unwrap();
        let fault = faults.recv().await.unwrap();
        assert!(matches!(fault.kind, FaultKind::StreamClosed));
    }
}
