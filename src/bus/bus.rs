//! # The event bus.
//!
//! [`EventBus`] broadcasts events to every subscriber, latches sticky state per
//! type and delegates durability to a [`PersistenceRegistry`].
//!
//! ## Publish pipeline
//! ```text
//! publish(ev)
//!   ├─► ev.validate(bus)            Err → BusError::Validation     (nothing happens)
//!   ├─► lock shard(type)
//!   │     ├─► key rule (first-wins)  Err → BusError::KeyFormat      (nothing happens)
//!   │     ├─► latch Sticky / Collection[key]
//!   │     └─► broadcast (never blocks)
//!   └─► ev.is_persistable() → registry.persist(ev)   Err → BusError::Persistence
//! ```
//!
//! ## Sticky reads
//! ```text
//! get_sticky(T)        : memory ──miss──► registry.read_persisted(T).first() ──miss──► defaults(T)
//! get_sticky_keyed(T,k): memory ──miss──► key rule check ──► registry.read_persisted_keyed(T,k).first() ──► defaults(T)
//! ```
//! The memory lookup runs under the type's lock; the fallback does not. A
//! concurrent publish completing in between is seen by the next reader.
//!
//! ## Rules
//! - Same-type publish/read/delete are mutually exclusive; different types never contend.
//! - Broadcast is non-blocking: slow receivers lag, they never stall a publisher.
//! - A publish with no receivers is not an error; latching and persistence still happen.
//! - Validation and key errors are returned to the caller and never broadcast.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::shard::ShardMap;
use super::subscribe::Subscribe;
use super::subscription::Subscription;
use crate::config::RuntimeConfig;
use crate::error::BusError;
use crate::events::{Event, EventKey, EventRef, EventType, Stickiness};
use crate::persist::{DefaultFactory, NoDefaults, NoPersistence, PersistenceRegistry};

struct Inner {
    tx: broadcast::Sender<EventRef>,
    shards: ShardMap,
    persistence: Arc<dyn PersistenceRegistry>,
    defaults: Arc<dyn DefaultFactory>,
    config: RuntimeConfig,
}

/// Process-local publish/subscribe bus with sticky state.
///
/// Cheap to clone; all clones share the same channel and state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.inner.tx.receiver_count())
            .field("types", &self.inner.shards.len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with default config, no persistence and no defaults.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a bus with the given config, no persistence and no defaults.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Starts a builder for injecting collaborators.
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// Config this bus was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Creates a receiver observing every event published from now on.
    pub fn receiver(&self) -> broadcast::Receiver<EventRef> {
        self.inner.tx.subscribe()
    }

    /// Publishes an event.
    pub async fn publish<E: Event>(&self, event: E) -> Result<(), BusError> {
        self.publish_arc(Arc::new(event)).await
    }

    /// Publishes an already shared event.
    ///
    /// Returns after the persistence registry has stored the event, so call-site
    /// ordering is preserved for persistable events.
    pub async fn publish_arc(&self, event: EventRef) -> Result<(), BusError> {
        let ty = event.event_type();

        event
            .validate(self)
            .await
            .map_err(|source| BusError::Validation {
                event_type: ty,
                source,
            })?;

        let key = event.key();
        {
            let shard = self.inner.shards.get(ty);
            let mut shard = shard.lock().await;

            if let Some(key) = &key {
                if let Some(rule) = shard.resolve_rule(|| event.key_rule()) {
                    if !rule.is_valid(key) {
                        return Err(BusError::KeyFormat {
                            event_type: ty,
                            key: key.clone(),
                            rule: rule.clone(),
                        });
                    }
                }
            }

            match event.stickiness() {
                Stickiness::None => {}
                Stickiness::Sticky => shard.sticky = Some(Arc::clone(&event)),
                Stickiness::Collection => {
                    let key = key.ok_or(BusError::MissingKey { event_type: ty })?;
                    shard.collection.insert(key, Arc::clone(&event));
                }
            }

            let receivers = self.inner.tx.send(Arc::clone(&event)).unwrap_or(0);
            trace!(event_type = %ty, receivers, "event broadcast");
        }

        if event.is_persistable() {
            self.inner
                .persistence
                .persist(event)
                .await
                .map_err(|source| BusError::Persistence {
                    event_type: ty,
                    source,
                })?;
        }
        Ok(())
    }

    /// Reads the latest instance of a sticky type.
    ///
    /// Falls back to persistence, then to the default factory. Fails only if a
    /// collaborator fails or no default is registered.
    pub async fn get_sticky<E: Event + Clone>(&self) -> Result<E, BusError> {
        downcast(self.get_sticky_erased(EventType::of::<E>()).await?)
    }

    /// Type-erased [`get_sticky`](Self::get_sticky).
    pub async fn get_sticky_erased(&self, ty: EventType) -> Result<EventRef, BusError> {
        if let Some(ev) = self.inner.shards.get(ty).lock().await.sticky.clone() {
            return Ok(ev);
        }
        debug!(event_type = %ty, "sticky miss, reading persistence");

        let persisted = self
            .inner
            .persistence
            .read_persisted(ty)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })?;
        match persisted.into_iter().next() {
            Some(ev) => Ok(ev),
            None => Ok(self.inner.defaults.create_default(ty)?),
        }
    }

    /// Reads the latched instance of a collection type with the given key.
    ///
    /// On a miss the key is checked against the cached rule of the type before
    /// falling back, so a malformed key fails with [`BusError::KeyFormat`]. The
    /// default instance may carry a different key than requested.
    pub async fn get_sticky_keyed<E: Event + Clone>(
        &self,
        key: impl Into<EventKey>,
    ) -> Result<E, BusError> {
        downcast(
            self.get_sticky_keyed_erased(EventType::of::<E>(), &key.into())
                .await?,
        )
    }

    /// Type-erased [`get_sticky_keyed`](Self::get_sticky_keyed).
    pub async fn get_sticky_keyed_erased(
        &self,
        ty: EventType,
        key: &EventKey,
    ) -> Result<EventRef, BusError> {
        let rule = {
            let shard = self.inner.shards.get(ty);
            let shard = shard.lock().await;
            if let Some(ev) = shard.collection.get(key) {
                return Ok(Arc::clone(ev));
            }
            shard.cached_rule().cloned()
        };
        if let Some(rule) = rule {
            if !rule.is_valid(key) {
                return Err(BusError::KeyFormat {
                    event_type: ty,
                    key: key.clone(),
                    rule,
                });
            }
        }
        debug!(event_type = %ty, %key, "keyed sticky miss, reading persistence");

        let persisted = self
            .inner
            .persistence
            .read_persisted_keyed(ty, key)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })?;
        match persisted.into_iter().next() {
            Some(ev) => Ok(ev),
            None => Ok(self.inner.defaults.create_default(ty)?),
        }
    }

    /// Reads every latched and persisted instance of a keyed type.
    ///
    /// The result is the union of both sources, de-duplicated by equality:
    /// in-memory instances first (ordered by key), then persisted ones.
    pub async fn get_collection<E: Event + Clone>(&self) -> Result<Vec<E>, BusError> {
        self.get_collection_erased(EventType::of::<E>())
            .await?
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// Type-erased [`get_collection`](Self::get_collection).
    pub async fn get_collection_erased(&self, ty: EventType) -> Result<Vec<EventRef>, BusError> {
        let mut out: Vec<EventRef> = self
            .inner
            .shards
            .get(ty)
            .lock()
            .await
            .collection
            .values()
            .cloned()
            .collect();

        let persisted = self
            .inner
            .persistence
            .read_persisted_collection(ty)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })?;
        for ev in persisted {
            if !out.iter().any(|seen| seen.same_value(ev.as_ref())) {
                out.push(ev);
            }
        }
        Ok(out)
    }

    /// Removes the sticky instance of `E` from memory and persistence.
    pub async fn delete<E: Event>(&self) -> Result<(), BusError> {
        self.delete_erased(EventType::of::<E>()).await
    }

    /// Type-erased [`delete`](Self::delete).
    pub async fn delete_erased(&self, ty: EventType) -> Result<(), BusError> {
        self.inner.shards.get(ty).lock().await.sticky = None;
        self.inner
            .persistence
            .delete_persisted(ty)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })
    }

    /// Removes the keyed instance of `E` from memory and persistence.
    pub async fn delete_keyed<E: Event>(&self, key: impl Into<EventKey>) -> Result<(), BusError> {
        self.delete_keyed_erased(EventType::of::<E>(), &key.into())
            .await
    }

    /// Type-erased [`delete_keyed`](Self::delete_keyed).
    pub async fn delete_keyed_erased(&self, ty: EventType, key: &EventKey) -> Result<(), BusError> {
        self.inner.shards.get(ty).lock().await.collection.remove(key);
        self.inner
            .persistence
            .delete_persisted_keyed(ty, key)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })
    }

    /// Removes every keyed instance of `E` from memory and persistence.
    pub async fn clear_collection<E: Event>(&self) -> Result<(), BusError> {
        let ty = EventType::of::<E>();
        self.inner.shards.get(ty).lock().await.collection.clear();
        self.inner
            .persistence
            .clear_persisted_collection(ty)
            .await
            .map_err(|source| BusError::Persistence {
                event_type: ty,
                source,
            })
    }

    /// Attaches a subscriber with its own worker and bounded queue.
    ///
    /// The subscriber observes events published after this call.
    pub fn attach(&self, sub: Arc<dyn Subscribe>) -> Subscription {
        let capacity = sub
            .queue_capacity()
            .unwrap_or_else(|| self.inner.config.subscriber_queue_clamped());
        Subscription::spawn(sub, self.receiver(), capacity)
    }

    /// Runs `handler` for every published `E` until `token` is cancelled.
    ///
    /// Handler calls are sequential. Events skipped because the handler fell
    /// behind the broadcast ring are logged and not replayed.
    pub fn subscribe_to<E, F, Fut>(&self, token: CancellationToken, mut handler: F) -> JoinHandle<()>
    where
        E: Event + Clone,
        F: FnMut(E) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.receiver();
        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => break,
                    res = rx.recv() => match res {
                        Ok(ev) => ev,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(event_type = %EventType::of::<E>(), skipped = n, "typed subscription lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if let Some(ev) = ev.downcast_ref::<E>() {
                    handler(ev.clone()).await;
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn shard_rule(&self, ty: EventType) -> Option<crate::events::KeyRule> {
        self.inner.shards.get(ty).lock().await.cached_rule().cloned()
    }
}

fn downcast<E: Event + Clone>(ev: EventRef) -> Result<E, BusError> {
    ev.downcast_ref::<E>()
        .cloned()
        .ok_or_else(|| BusError::TypeMismatch {
            expected: EventType::of::<E>(),
            found: ev.event_type(),
        })
}

/// Builder for an [`EventBus`] with injected collaborators.
pub struct EventBusBuilder {
    config: RuntimeConfig,
    persistence: Arc<dyn PersistenceRegistry>,
    defaults: Arc<dyn DefaultFactory>,
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            persistence: Arc::new(NoPersistence),
            defaults: Arc::new(NoDefaults),
        }
    }
}

impl EventBusBuilder {
    /// Sets the runtime config.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the persistence registry.
    pub fn persistence(mut self, registry: Arc<dyn PersistenceRegistry>) -> Self {
        self.persistence = registry;
        self
    }

    /// Sets the default-value factory.
    pub fn defaults(mut self, factory: Arc<dyn DefaultFactory>) -> Self {
        self.defaults = factory;
        self
    }

    /// Builds the bus.
    pub fn build(self) -> EventBus {
        let (tx, _rx) = broadcast::channel(self.config.bus_capacity_clamped());
        EventBus {
            inner: Arc::new(Inner {
                tx,
                shards: ShardMap::default(),
                persistence: self.persistence,
                defaults: self.defaults,
                config: self.config,
            }),
        }
    }
}
