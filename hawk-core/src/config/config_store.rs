//! Shared settings that can be swapped at runtime.
//!
//! A [`ConfigStore`] holds the current value behind a `watch` channel.
//! Readers take a cheap `Arc` snapshot; long-running tasks hold a
//! [`ConfigWatcher`] and reconcile whenever a new value is published.

use std::sync::Arc;

use tokio::sync::watch;

/// A shared, replaceable value with change notification.
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<Arc<T>>>,
}

/// Waits for new values of a [`ConfigStore`].
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Publish `value` to every watcher.
    pub fn update(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Snapshot of the current value.
    pub fn current(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait for the next published value.
    ///
    /// Returns `None` once every [`ConfigStore`] handle has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_sees_latest_value() {
        let store = ConfigStore::new(vec!["alpha".to_string()]);
        let mut watcher = store.subscribe();

        store.update(vec!["beta".to_string()]);
        store.update(vec!["gamma".to_string()]);
        let seen = watcher.changed().await.unwrap();
        assert_eq!(seen.as_slice(), ["gamma".to_string()]);
        assert_eq!(store.current().as_slice(), ["gamma".to_string()]);
    }

    #[tokio::test]
    async fn test_watcher_ends_when_store_dropped() {
        let store = ConfigStore::new(0u32);
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_none());
    }
}
