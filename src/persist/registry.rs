//! # Persistence registry contract.
//!
//! The bus hands persistable events to a [`PersistenceRegistry`] on publish and
//! consults it when a sticky read misses memory. Durable storage lives behind
//! this trait; the crate ships two implementations:
//!
//! - [`NoPersistence`]: stores nothing, reads nothing (the bus default).
//! - [`InMemoryRegistry`]: keeps persisted events in process memory; useful in
//!   tests and as a reference for real adapters.
//!
//! ## Contract
//! - Every call is async and may fail; failures propagate to the bus caller.
//! - Reads return lists; the bus uses the **first** element for singleton reads.
//! - Deletes of absent entries succeed.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::events::{EventKey, EventRef, EventType};

/// Storage backend for persistable events.
#[async_trait]
pub trait PersistenceRegistry: Send + Sync + 'static {
    /// Stores one published event.
    async fn persist(&self, event: EventRef) -> anyhow::Result<()>;

    /// Reads persisted sticky instances of a type.
    async fn read_persisted(&self, ty: EventType) -> anyhow::Result<Vec<EventRef>>;

    /// Reads persisted instances of a keyed type with the given key.
    async fn read_persisted_keyed(
        &self,
        ty: EventType,
        key: &EventKey,
    ) -> anyhow::Result<Vec<EventRef>>;

    /// Reads every persisted instance of a keyed type.
    async fn read_persisted_collection(&self, ty: EventType) -> anyhow::Result<Vec<EventRef>>;

    /// Deletes the persisted sticky instance of a type.
    async fn delete_persisted(&self, ty: EventType) -> anyhow::Result<()>;

    /// Deletes the persisted instance of a keyed type with the given key.
    async fn delete_persisted_keyed(&self, ty: EventType, key: &EventKey) -> anyhow::Result<()>;

    /// Deletes every persisted instance of a keyed type.
    async fn clear_persisted_collection(&self, ty: EventType) -> anyhow::Result<()>;
}

/// Registry that persists nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPersistence;

#[async_trait]
impl PersistenceRegistry for NoPersistence {
    async fn persist(&self, _event: EventRef) -> anyhow::Result<()> {
        Ok(())
    }

    async fn read_persisted(&self, _ty: EventType) -> anyhow::Result<Vec<EventRef>> {
        Ok(Vec::new())
    }

    async fn read_persisted_keyed(
        &self,
        _ty: EventType,
        _key: &EventKey,
    ) -> anyhow::Result<Vec<EventRef>> {
        Ok(Vec::new())
    }

    async fn read_persisted_collection(&self, _ty: EventType) -> anyhow::Result<Vec<EventRef>> {
        Ok(Vec::new())
    }

    async fn delete_persisted(&self, _ty: EventType) -> anyhow::Result<()> {
        Ok(())
    }

    async fn delete_persisted_keyed(&self, _ty: EventType, _key: &EventKey) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clear_persisted_collection(&self, _ty: EventType) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Stored {
    single: Option<EventRef>,
    keyed: HashMap<EventKey, EventRef>,
}

/// Registry keeping persisted events in memory.
///
/// Keyed events are stored per key, unkeyed events as a per-type singleton.
#[derive(Default)]
pub struct InMemoryRegistry {
    inner: Mutex<HashMap<EventType, Stored>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events across all types.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .values()
            .map(|s| s.keyed.len() + usize::from(s.single.is_some()))
            .sum()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceRegistry for InMemoryRegistry {
    async fn persist(&self, event: EventRef) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner.entry(event.event_type()).or_default();
        match event.key() {
            Some(key) => {
                slot.keyed.insert(key, event);
            }
            None => slot.single = Some(event),
        }
        Ok(())
    }

    async fn read_persisted(&self, ty: EventType) -> anyhow::Result<Vec<EventRef>> {
        Ok(self
            .inner
            .lock()
            .get(&ty)
            .and_then(|s| s.single.clone())
            .into_iter()
            .collect())
    }

    async fn read_persisted_keyed(
        &self,
        ty: EventType,
        key: &EventKey,
    ) -> anyhow::Result<Vec<EventRef>> {
        Ok(self
            .inner
            .lock()
            .get(&ty)
            .and_then(|s| s.keyed.get(key).cloned())
            .into_iter()
            .collect())
    }

    async fn read_persisted_collection(&self, ty: EventType) -> anyhow::Result<Vec<EventRef>> {
        Ok(self
            .inner
            .lock()
            .get(&ty)
            .map(|s| s.keyed.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_persisted(&self, ty: EventType) -> anyhow::Result<()> {
        if let Some(s) = self.inner.lock().get_mut(&ty) {
            s.single = None;
        }
        Ok(())
    }

    async fn delete_persisted_keyed(&self, ty: EventType, key: &EventKey) -> anyhow::Result<()> {
        if let Some(s) = self.inner.lock().get_mut(&ty) {
            s.keyed.remove(key);
        }
        Ok(())
    }

    async fn clear_persisted_collection(&self, ty: EventType) -> anyhow::Result<()> {
        if let Some(s) = self.inner.lock().get_mut(&ty) {
            s.keyed.clear();
        }
        Ok(())
    }
}
