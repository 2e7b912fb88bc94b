//! SourceSync processor.
//!
//! Keeps the registry in line with the source list. Whenever a new
//! [`SourceList`] is published to its [`ConfigStore`] (on SIGHUP), sources that
//! disappeared are removed and new handles are registered, which starts their
//! resolution if the transport is connected. Existing sources keep their
//! status and entity.

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ConfigStore, ConfigWatcher, SourceList};
use crate::registry::{MonitoringSource, RegistryError, SourceId, SourceRegistry};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<SourceId>,
    pub removed: Vec<SourceId>,
}

pub struct SourceSync {
    registry: SourceRegistry,
}

impl SourceSync {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }

    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        store: ConfigStore<SourceList>,
        mut watcher: ConfigWatcher<SourceList>,
    ) {
        let initial = self.apply_diff(&store.current()).await;
        info!(sources = initial.added.len(), "SourceSync started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("SourceSync received shutdown signal");
                        break;
                    }
                }

                changed = watcher.changed() => {
                    let Some(list) = changed else {
                        info!("Source list store dropped");
                        break;
                    };
                    let report = self.apply_diff(&list).await;
                    info!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        "SourceSync reconciled source list"
                    );
                }
            }
        }

        info!("SourceSync shutdown complete");
    }

    /// Reconcile the registry against `list`.
    pub async fn apply_diff(&self, list: &SourceList) -> SyncReport {
        let mut report = SyncReport::default();

        for id in self.registry.ids().await {
            if !list.handles.iter().any(|h| h == id.as_str()) && self.registry.remove(&id).await.is_some() {
                report.removed.push(id);
            }
        }

        for handle in &list.handles {
            match self.registry.add(MonitoringSource::active(handle.clone())).await {
                Ok(_) => report.added.push(SourceId::new(handle.clone())),
                Err(RegistryError::DuplicateSource(_)) => {}
                Err(e) => warn!(handle = %handle, error = %e, "Failed to register source"),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::SourceStatus;
    use crate::testing::MockTransport;

    fn list(handles: &[&str]) -> SourceList {
        SourceList {
            handles: handles.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_apply_diff() {
        let registry = SourceRegistry::new(Arc::new(MockTransport::new()));
        let sync = SourceSync::new(registry.clone());

        let first = sync.apply_diff(&list(&["alpha", "beta"])).await;
        assert_eq!(first.added.len(), 2);
        registry
            .set_status(&SourceId::new("beta"), SourceStatus::Paused)
            .await
            .unwrap();

        let second = sync.apply_diff(&list(&["beta", "gamma"])).await;
        assert_eq!(second.added, vec![SourceId::new("gamma")]);
        assert_eq!(second.removed, vec![SourceId::new("alpha")]);
        // Kept sources keep their status.
        assert_eq!(
            registry.get(&SourceId::new("beta")).await.unwrap().status,
            SourceStatus::Paused
        );
    }

    #[tokio::test]
    async fn test_run_reacts_to_updates() {
        let registry = SourceRegistry::new(Arc::new(MockTransport::new()));
        let store = ConfigStore::new(list(&["alpha"]));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(SourceSync::new(registry.clone()).run(
            shutdown_rx,
            store.clone(),
            store.subscribe(),
        ));

        store.update(list(&["alpha", "beta"]));
        for _ in 0..50 {
            if registry.len().await == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.len().await, 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
