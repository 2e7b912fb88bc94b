//! Registered monitoring sources and their resolved chat entities.
//!
//! The registry is the only owner of source status. Resolution binds a source
//! to the [`ChatEntity`] the transport returns for its handle; the reverse
//! index from chat id back to source is what live routing uses.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{ChatEntity, ChatTransport, TransportError};

/// Opaque identity of a source: its normalized handle or numeric chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringSource {
    pub id: SourceId,
    /// Handle passed to the transport for resolution.
    pub handle: String,
    pub status: SourceStatus,
}

impl MonitoringSource {
    /// An active source whose id is its handle.
    pub fn active(handle: impl Into<String>) -> Self {
        let handle = handle.into();
        Self {
            id: SourceId::new(handle.clone()),
            handle,
            status: SourceStatus::Active,
        }
    }
}

/// What the live router needs to know about the source of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedSource {
    pub id: SourceId,
    pub name: String,
    pub status: SourceStatus,
}

/// An active source that has a resolved entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub id: SourceId,
    pub name: String,
    pub entity: ChatEntity,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("source {0} is not registered")]
    UnknownSource(SourceId),

    #[error("source {0} is already registered")]
    DuplicateSource(SourceId),

    #[error("failed to resolve source {source_id}: {error}")]
    Resolution {
        source_id: SourceId,
        #[source]
        error: TransportError,
    },
}

impl RegistryError {
    pub fn flood_wait(&self) -> Option<u64> {
        match self {
            RegistryError::Resolution { error, .. } => error.flood_wait(),
            _ => None,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    sources: HashMap<SourceId, MonitoringSource>,
    entities: HashMap<SourceId, ChatEntity>,
    by_chat: HashMap<i64, SourceId>,
    /// Set while the network has told us to back off.
    suspended_until: Option<Instant>,
}

impl RegistryInner {
    fn display_name(&self, id: &SourceId) -> Option<String> {
        let source = self.sources.get(id)?;
        Some(
            self.entities
                .get(id)
                .and_then(ChatEntity::display_name)
                .unwrap_or(&source.handle)
                .to_owned(),
        )
    }

    fn is_suspended(&self) -> bool {
        self.suspended_until.is_some_and(|until| Instant::now() < until)
    }

    fn unbind(&mut self, id: &SourceId) {
        if let Some(entity) = self.entities.remove(id) {
            self.by_chat.remove(&entity.id);
        }
    }
}

/// Registry of monitored sources. Cloning shares the same registry.
#[derive(Clone)]
pub struct SourceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    transport: Arc<dyn ChatTransport>,
}

impl SourceRegistry {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            transport,
        }
    }

    /// Register `source`.
    ///
    /// If the transport is connected and not suspended, entity resolution
    /// starts in the background and its handle is returned. Otherwise the
    /// source waits for [`SourceRegistry::resolve_pending`].
    pub async fn add(
        &self,
        source: MonitoringSource,
    ) -> Result<Option<JoinHandle<()>>, RegistryError> {
        let id = source.id.clone();
        let suspended = {
            let mut inner = self.inner.write().await;
            if inner.sources.contains_key(&id) {
                return Err(RegistryError::DuplicateSource(id));
            }
            info!(source = %id, handle = %source.handle, "Registered source");
            inner.sources.insert(id.clone(), source);
            inner.is_suspended()
        };

        if suspended {
            debug!(source = %id, "Transport suspended, deferring resolution");
            return Ok(None);
        }
        if !self.transport.is_connected() {
            return Ok(None);
        }
        let registry = self.clone();
        Ok(Some(tokio::spawn(async move {
            // Failures are logged inside resolve.
            let _ = registry.resolve(&id).await;
        })))
    }

    /// Defer background resolution until `until`.
    pub async fn suspend_until(&self, until: Instant) {
        self.inner.write().await.suspended_until = Some(until);
    }

    pub async fn resume(&self) {
        self.inner.write().await.suspended_until = None;
    }

    pub async fn is_suspended(&self) -> bool {
        self.inner.read().await.is_suspended()
    }

    /// Remove a source together with its resolved entity.
    pub async fn remove(&self, id: &SourceId) -> Option<MonitoringSource> {
        let mut inner = self.inner.write().await;
        inner.unbind(id);
        let removed = inner.sources.remove(id);
        if removed.is_some() {
            info!(source = %id, "Removed source");
        }
        removed
    }

    /// Flip the status of a source. Does not touch the transport.
    pub async fn set_status(&self, id: &SourceId, status: SourceStatus) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let source = inner
            .sources
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownSource(id.clone()))?;
        if source.status != status {
            debug!(source = %id, ?status, "Source status changed");
            source.status = status;
        }
        Ok(())
    }

    /// Resolve the entity of a source through the transport.
    ///
    /// On failure the source stays registered without an entity.
    pub async fn resolve(&self, id: &SourceId) -> Result<ChatEntity, RegistryError> {
        let handle = {
            let inner = self.inner.read().await;
            let source = inner
                .sources
                .get(id)
                .ok_or_else(|| RegistryError::UnknownSource(id.clone()))?;
            source.handle.clone()
        };

        let entity = match self.transport.resolve_entity(&handle).await {
            Ok(entity) => entity,
            Err(error) => {
                warn!(source = %id, handle = %handle, error = %error, "Failed to resolve source");
                return Err(RegistryError::Resolution {
                    source_id: id.clone(),
                    error,
                });
            }
        };

        let mut inner = self.inner.write().await;
        if !inner.sources.contains_key(id) {
            // Removed while the lookup was in flight.
            return Err(RegistryError::UnknownSource(id.clone()));
        }
        inner.unbind(id);
        if let Some(previous) = inner.by_chat.insert(entity.id, id.clone()) {
            if &previous != id {
                warn!(
                    source = %id,
                    previous = %previous,
                    chat_id = entity.id,
                    "Chat was bound to another source, rebinding"
                );
                inner.entities.remove(&previous);
            }
        }
        inner.entities.insert(id.clone(), entity.clone());
        Ok(entity)
    }

    /// Resolve every active source that has no entity yet.
    ///
    /// Returns the outcome per source. Stops early on a rate-limit error,
    /// which is returned as the last element.
    pub async fn resolve_pending(&self) -> Vec<(SourceId, Result<ChatEntity, RegistryError>)> {
        let pending: Vec<SourceId> = {
            let inner = self.inner.read().await;
            let mut ids: Vec<SourceId> = inner
                .sources
                .values()
                .filter(|s| s.status == SourceStatus::Active && !inner.entities.contains_key(&s.id))
                .map(|s| s.id.clone())
                .collect();
            ids.sort();
            ids
        };

        let mut results = Vec::with_capacity(pending.len());
        for id in pending {
            let result = self.resolve(&id).await;
            let rate_limited = matches!(&result, Err(e) if e.flood_wait().is_some());
            results.push((id, result));
            if rate_limited {
                break;
            }
        }
        results
    }

    /// Route a chat id back to its registered source.
    pub async fn lookup_by_chat(&self, chat_id: i64) -> Option<RoutedSource> {
        let inner = self.inner.read().await;
        let id = inner.by_chat.get(&chat_id)?;
        let source = inner.sources.get(id)?;
        Some(RoutedSource {
            id: id.clone(),
            name: inner.display_name(id)?,
            status: source.status,
        })
    }

    /// Active sources with a resolved entity, ordered by id.
    pub async fn active_resolved(&self) -> Vec<ResolvedSource> {
        let inner = self.inner.read().await;
        let mut resolved: Vec<ResolvedSource> = inner
            .sources
            .values()
            .filter(|s| s.status == SourceStatus::Active)
            .filter_map(|s| {
                let entity = inner.entities.get(&s.id)?;
                Some(ResolvedSource {
                    id: s.id.clone(),
                    name: inner.display_name(&s.id)?,
                    entity: entity.clone(),
                })
            })
            .collect();
        resolved.sort_by(|a, b| a.id.cmp(&b.id));
        resolved
    }

    pub async fn get(&self, id: &SourceId) -> Option<MonitoringSource> {
        self.inner.read().await.sources.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.inner.read().await.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sources.len()
    }
}
