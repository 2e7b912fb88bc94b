pub mod discovered_contract;

pub use discovered_contract::{ContractStatus, DiscoveredContract};

/// Convert to the UTC wall-clock time stored in `TIMESTAMP` columns.
pub fn to_primitive_utc(at: time::OffsetDateTime) -> time::PrimitiveDateTime {
    let utc = at.to_offset(time::UtcOffset::UTC);
    time::PrimitiveDateTime::new(utc.date(), utc.time())
}
