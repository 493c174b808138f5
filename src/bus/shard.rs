//! Per-type latched state.
//!
//! One [`Shard`] exists per event type that was ever published, read or deleted.
//! It is guarded by its own async mutex, so different types never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::events::{EventKey, EventRef, EventType, KeyRule};

/// Latched state and cached key rule of one event type.
#[derive(Default)]
pub(crate) struct Shard {
    /// Latest sticky instance.
    pub sticky: Option<EventRef>,
    /// Latched keyed instances, ordered by key.
    pub collection: BTreeMap<EventKey, EventRef>,
    /// Key rule: `None` until the first keyed instance is validated.
    rule: Option<Option<KeyRule>>,
}

impl Shard {
    /// Returns the cached rule, caching `first_seen` if nothing is cached yet.
    ///
    /// Later calls ignore their argument: the first resolved rule wins.
    pub fn resolve_rule(&mut self, first_seen: impl FnOnce() -> Option<KeyRule>) -> Option<&KeyRule> {
        self.rule.get_or_insert_with(first_seen).as_ref()
    }

    /// Returns the cached rule without resolving it.
    pub fn cached_rule(&self) -> Option<&KeyRule> {
        self.rule.as_ref().and_then(Option::as_ref)
    }
}

/// Lazily populated map from event type to its shard.
#[derive(Default)]
pub(crate) struct ShardMap {
    shards: Mutex<HashMap<EventType, Arc<AsyncMutex<Shard>>>>,
}

impl ShardMap {
    /// Returns the shard of `ty`, creating it on first access.
    pub fn get(&self, ty: EventType) -> Arc<AsyncMutex<Shard>> {
        Arc::clone(self.shards.lock().entry(ty).or_default())
    }

    /// Number of types with a shard.
    pub fn len(&self) -> usize {
        self.shards.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_resolved_rule_wins() {
        let mut shard = Shard::default();
        assert!(shard.cached_rule().is_none());

        let first = shard
            .resolve_rule(|| Some(KeyRule::ItemsRange { min: 0, max: 3 }))
            .cloned();
        assert!(matches!(first, Some(KeyRule::ItemsRange { min: 0, max: 3 })));

        let second = shard
            .resolve_rule(|| Some(KeyRule::ItemsRange { min: 10, max: 30 }))
            .cloned();
        assert!(matches!(second, Some(KeyRule::ItemsRange { min: 0, max: 3 })));
    }

    #[test]
    fn test_absent_rule_is_cached_too() {
        let mut shard = Shard::default();
        assert!(shard.resolve_rule(|| None).is_none());
        assert!(shard
            .resolve_rule(|| Some(KeyRule::ItemsRange { min: 0, max: 1 }))
            .is_none());
    }

    #[test]
    fn test_shards_are_created_once_per_type() {
        let map = ShardMap::default();
        let a = map.get(EventType::of::<u8>());
        let b = map.get(EventType::of::<u8>());
        let _c = map.get(EventType::of::<u16>());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(map.len(), 2);
    }
}
