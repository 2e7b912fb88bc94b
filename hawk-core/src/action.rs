//! The downstream trade action fired on first live detections.

use std::time::Duration;

use async_trait::async_trait;
use hawk_sdk::objects::TradeRequest;
use hawk_sdk::signature::{SIGNATURE_HEADER, WebhookSigner};
use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

use crate::events::Detection;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("trade endpoint answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handler invoked for true live, first-time detections.
///
/// Errors are logged by the dispatcher and never reach ingestion.
#[async_trait]
pub trait TradeAction: Send + Sync {
    async fn execute(&self, detection: &Detection) -> Result<(), ActionError>;
}

/// Posts a signed [`TradeRequest`] to an external trading endpoint.
pub struct WebhookTradeAction {
    http_client: reqwest::Client,
    url: Url,
    signer: WebhookSigner,
    amount: Decimal,
}

impl WebhookTradeAction {
    pub fn new(url: Url, secret: &[u8], amount: Decimal) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
            signer: WebhookSigner::new(secret),
            amount,
        }
    }

    pub fn request_for(&self, detection: &Detection) -> TradeRequest {
        TradeRequest {
            contract: detection.address.to_string(),
            group: detection.source_name.clone(),
            amount: self.amount,
            detected_at: detection.detected_at.unix_timestamp(),
        }
    }
}

#[async_trait]
impl TradeAction for WebhookTradeAction {
    async fn execute(&self, detection: &Detection) -> Result<(), ActionError> {
        let signed = self.signer.sign(&self.request_for(detection))?;

        let response = self
            .http_client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.header)
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ActionError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
