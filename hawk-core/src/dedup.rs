//! Process-wide set of addresses that have already been dispatched.

use std::sync::Arc;

use dashmap::DashSet;

use crate::address::ContractAddress;

/// The dedup gate. Cloning shares the same set.
///
/// Entries are never evicted for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    seen: Arc<DashSet<ContractAddress>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, address: &ContractAddress) -> bool {
        self.seen.contains(address)
    }

    pub fn mark(&self, address: ContractAddress) {
        self.seen.insert(address);
    }

    /// Atomically mark `address`. Returns `true` only for the first caller.
    pub fn try_mark(&self, address: &ContractAddress) -> bool {
        self.seen.insert(address.clone())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
