//! DetectionPipeline.
//!
//! The path shared by live and replayed messages:
//! text recovery -> address extraction -> dedup gate -> `Detection`.
//!
//! Addresses stopped by the gate are still forwarded with `first_seen = false`
//! so observers see every sighting; only the first one is persisted or traded.

use std::convert::Infallible;
use std::sync::Arc;

use hawk_sdk::objects::Delivery;
use kanau::processor::Processor;
use tracing::{debug, info, warn};

use crate::address::AddressExtractor;
use crate::dedup::Deduplicator;
use crate::events::{Detection, DetectionSender};
use crate::message::{IncomingMessage, recover_text};
use crate::transport::ChatTransport;

/// A message attributed to a registered source.
#[derive(Debug, Clone)]
pub struct SourcedMessage {
    pub message: IncomingMessage,
    pub source_name: String,
    pub delivery: Delivery,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    transport: Arc<dyn ChatTransport>,
    extractor: AddressExtractor,
    dedup: Deduplicator,
    detection_tx: DetectionSender,
}

impl DetectionPipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        extractor: AddressExtractor,
        dedup: Deduplicator,
        detection_tx: DetectionSender,
    ) -> Self {
        Self {
            transport,
            extractor,
            dedup,
            detection_tx,
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }
}

impl Processor<SourcedMessage> for DetectionPipeline {
    /// Number of first-seen detections emitted.
    type Output = usize;
    type Error = Infallible;

    async fn process(&self, input: SourcedMessage) -> Result<usize, Infallible> {
        let SourcedMessage {
            message,
            source_name,
            delivery,
        } = input;

        let Some(recovered) = recover_text(self.transport.as_ref(), &message).await else {
            debug!(
                chat_id = message.chat_id,
                message_id = message.id,
                "Message has no recoverable text"
            );
            return Ok(0);
        };

        let mut emitted = 0;
        for address in self.extractor.extract(&recovered.text) {
            let first_seen = self.dedup.try_mark(&address);
            if first_seen {
                info!(
                    address = %address,
                    source = %source_name,
                    %delivery,
                    origin = ?recovered.origin,
                    "New contract detected"
                );
            } else {
                debug!(address = %address, source = %source_name, %delivery, "Address already dispatched, notifying only");
            }
            let detection = Detection {
                address,
                source_name: source_name.clone(),
                delivery,
                detected_at: time::OffsetDateTime::now_utc(),
                first_seen,
            };
            if let Err(e) = self.detection_tx.send(detection).await {
                // The address stays marked; the dispatcher is gone for good.
                warn!(address = %e.0.address, "Detection channel closed, dropping detection");
                break;
            }
            if first_seen {
                emitted += 1;
            }
        }
        Ok(emitted)
    }
}
