use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "contract_status", rename_all = "snake_case")]
pub enum ContractStatus {
    Found,
    Bought,
    BuyFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DiscoveredContract {
    pub id: i64,
    pub address: String,
    pub source_name: String,
    pub status: ContractStatus,
    pub discovered_at: time::PrimitiveDateTime,
}

/// Record a discovery unless the address is already known.
///
/// Never overwrites an existing row; `inserted` tells the two cases apart.
pub struct UpsertDiscoveredContract {
    pub address: String,
    pub source_name: String,
    pub discovered_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub record: DiscoveredContract,
    pub inserted: bool,
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    record: DiscoveredContract,
    inserted: bool,
}

impl Processor<UpsertDiscoveredContract> for DatabaseProcessor {
    type Output = UpsertOutcome;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertDiscoveredContract")]
    async fn process(&self, upsert: UpsertDiscoveredContract) -> Result<UpsertOutcome, sqlx::Error> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO discovered_contracts (address, source_name, status, discovered_at)
            VALUES ($1, $2, 'found', $3)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING id, address, source_name, status, discovered_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(upsert.address)
        .bind(upsert.source_name)
        .bind(upsert.discovered_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(UpsertOutcome {
            record: row.record,
            inserted: row.inserted,
        })
    }
}

pub struct UpdateContractStatus {
    pub address: String,
    pub status: ContractStatus,
}

impl Processor<UpdateContractStatus> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateContractStatus")]
    async fn process(&self, update: UpdateContractStatus) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE discovered_contracts
            SET status = $2
            WHERE address = $1
            "#,
        )
        .bind(update.address)
        .bind(update.status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
