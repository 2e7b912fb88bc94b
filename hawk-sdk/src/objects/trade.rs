use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Body of the signed request sent to the trade-action endpoint when a
/// contract is detected live for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub contract: String,
    pub group: String,
    /// Amount to spend, in SOL.
    pub amount: Decimal,
    /// Unix timestamp (seconds) of the detection.
    pub detected_at: i64,
}
