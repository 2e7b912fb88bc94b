//! Persistent record of discovered contracts.

use async_trait::async_trait;
use kanau::processor::Processor;
use thiserror::Error;

use crate::entities::discovered_contract::{
    UpdateContractStatus, UpsertDiscoveredContract, UpsertOutcome,
};
use crate::entities::{ContractStatus, to_primitive_utc};
use crate::events::Detection;
use crate::framework::DatabaseProcessor;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no record for contract {0}")]
    NotFound(String),
}

/// Keyed, idempotent storage of discoveries.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Insert the discovery if its address is new. Idempotent on address.
    async fn upsert(&self, detection: &Detection) -> Result<UpsertOutcome, StoreError>;

    async fn set_status(&self, address: &str, status: ContractStatus) -> Result<(), StoreError>;
}

/// [`DiscoveryStore`] on the `discovered_contracts` table.
pub struct PgDiscoveryStore {
    db: DatabaseProcessor,
}

impl PgDiscoveryStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl DiscoveryStore for PgDiscoveryStore {
    async fn upsert(&self, detection: &Detection) -> Result<UpsertOutcome, StoreError> {
        let outcome = self
            .db
            .process(UpsertDiscoveredContract {
                address: detection.address.to_string(),
                source_name: detection.source_name.clone(),
                discovered_at: to_primitive_utc(detection.detected_at),
            })
            .await?;
        Ok(outcome)
    }

    async fn set_status(&self, address: &str, status: ContractStatus) -> Result<(), StoreError> {
        let updated = self
            .db
            .process(UpdateContractStatus {
                address: address.to_owned(),
                status,
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(address.to_owned()));
        }
        Ok(())
    }
}
