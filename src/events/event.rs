//! # Event model: capability-tagged values carried by the bus.
//!
//! Every value published on the [`EventBus`](crate::EventBus) implements [`Event`].
//! The trait is a marker with **opt-in capabilities**; each capability is a method
//! with a neutral default, so an event only overrides what it needs:
//!
//! | Capability        | Method                     | Effect on the bus                                  |
//! |-------------------|----------------------------|----------------------------------------------------|
//! | Validatable       | [`Event::validate`]        | an `Err` aborts `publish` before any side effect   |
//! | KeyValidatable    | [`Event::key`] + [`Event::key_rule`] | key checked against the per-type cached rule |
//! | Sticky            | [`Event::stickiness`] = `Sticky`     | latest instance latched per type         |
//! | StickyCollection  | [`Event::stickiness`] = `Collection` | latched per `(type, key)`                |
//! | Persistable       | [`Event::is_persistable`]  | handed to the persistence registry on publish      |
//!
//! Iterable families are read back with [`EventBus::get_collection`](crate::EventBus::get_collection);
//! any keyed type can be iterated.
//!
//! ## Type tags
//! [`EventType`] identifies a concrete event type (`TypeId` + type name). It keys
//! every per-type structure inside the bus and is what persistence and default
//! factories receive.
//!
//! ## Example
//! ```rust
//! use actorbus::{Event, EventKey, KeyRule, Stickiness};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Temperature { sensor: i64, celsius: f32 }
//!
//! impl Event for Temperature {
//!     fn stickiness(&self) -> Stickiness { Stickiness::Collection }
//!     fn key(&self) -> Option<EventKey> { Some(self.sensor.into()) }
//!     fn key_rule(&self) -> Option<KeyRule> { Some(KeyRule::ItemsRange { min: 1, max: 8 }) }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use super::key_rule::KeyRule;
use crate::bus::EventBus;

/// Shared handle to a published event.
///
/// The broadcast channel, mailboxes and sticky maps all hold the same allocation.
pub type EventRef = Arc<dyn Event>;

/// Stable identifier of a concrete event type.
///
/// Equality and hashing use the `TypeId` only; the name is kept for logs and errors.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// Returns the tag of `E`.
    #[inline]
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Fully qualified type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Key of a keyed (sticky-collection or key-validatable) event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
    /// Integer key (slots, partitions, indexes).
    Int(i64),
    /// String key (identifiers, names).
    Str(Arc<str>),
}

impl EventKey {
    /// Returns the integer value, if this is an integer key.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            EventKey::Int(v) => Some(*v),
            EventKey::Str(_) => None,
        }
    }

    /// Returns the string value, if this is a string key.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EventKey::Int(_) => None,
            EventKey::Str(s) => Some(s),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Int(v) => write!(f, "{v}"),
            EventKey::Str(s) => write!(f, "{s:?}"),
        }
    }
}

macro_rules! int_key_from {
    ($($t:ty),*) => {
        $(impl From<$t> for EventKey {
            fn from(v: $t) -> Self {
                EventKey::Int(i64::from(v))
            }
        })*
    };
}

int_key_from!(i8, i16, i32, i64, u8, u16, u32);

impl From<&str> for EventKey {
    fn from(v: &str) -> Self {
        EventKey::Str(Arc::from(v))
    }
}

impl From<String> for EventKey {
    fn from(v: String) -> Self {
        EventKey::Str(Arc::from(v))
    }
}

impl From<Arc<str>> for EventKey {
    fn from(v: Arc<str>) -> Self {
        EventKey::Str(v)
    }
}

/// How the bus latches an event after a successful publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stickiness {
    /// Broadcast only; nothing is retained.
    #[default]
    None,
    /// Latched singleton: the newest instance replaces the previous one.
    Sticky,
    /// Latched per key: instances with different keys coexist.
    Collection,
}

/// Object-safe helpers every event gets for free.
///
/// Implemented for all `PartialEq` types; used for downcasting and for the
/// equality-based de-duplication of [`EventBus::get_collection`](crate::EventBus::get_collection).
pub trait EventObject: Any + Send + Sync {
    /// Upcast to `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Value equality against another (possibly differently typed) event.
    fn dyn_eq(&self, other: &dyn Any) -> bool;
}

impl<T: Any + Send + Sync + PartialEq> EventObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|o| self == o)
    }
}

/// Marker trait for everything that travels over the bus.
///
/// All methods have defaults; a plain `impl Event for MyEvent {}` produces a
/// non-sticky, non-persisted, always-valid event.
#[async_trait]
pub trait Event: EventObject + fmt::Debug {
    /// Type tag of the concrete event type.
    fn event_type(&self) -> EventType {
        EventType::of::<Self>()
    }

    /// Latching behaviour. [`Stickiness::Collection`] requires [`Event::key`].
    fn stickiness(&self) -> Stickiness {
        Stickiness::None
    }

    /// Key of this instance (key-validatable and sticky-collection events).
    fn key(&self) -> Option<EventKey> {
        None
    }

    /// Key-format rule for this type.
    ///
    /// Resolved once per type: the bus caches the rule of the **first** instance
    /// it validates and ignores the rule of every later instance.
    fn key_rule(&self) -> Option<KeyRule> {
        None
    }

    /// Whether every publish must be handed to the persistence registry.
    fn is_persistable(&self) -> bool {
        false
    }

    /// Custom validation with read access to the bus.
    ///
    /// Returning `Err` rejects the publish: nothing is latched, broadcast or persisted.
    async fn validate(&self, _bus: &EventBus) -> anyhow::Result<()> {
        Ok(())
    }
}

impl dyn Event {
    /// True if the concrete type is `E`.
    #[inline]
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Borrow as the concrete type `E`.
    #[inline]
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Value equality between two type-erased events.
    #[inline]
    pub fn same_value(&self, other: &dyn Event) -> bool {
        self.dyn_eq(other.as_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Plain(u32);
    impl Event for Plain {}

    #[derive(Debug, Clone, PartialEq)]
    struct Other(u32);
    impl Event for Other {}

    #[test]
    fn event_type_identity_follows_concrete_type() {
        let a: EventRef = Arc::new(Plain(1));
        let b: EventRef = Arc::new(Plain(2));
        let c: EventRef = Arc::new(Other(1));

        assert_eq!(a.event_type(), b.event_type());
        assert_ne!(a.event_type(), c.event_type());
        assert_eq!(a.event_type(), EventType::of::<Plain>());
        assert!(a.event_type().name().ends_with("Plain"));
    }

    #[test]
    fn same_value_compares_type_and_content() {
        let a: EventRef = Arc::new(Plain(1));
        let a2: EventRef = Arc::new(Plain(1));
        let b: EventRef = Arc::new(Plain(2));
        let other: EventRef = Arc::new(Other(1));

        assert!(a.same_value(a2.as_ref()));
        assert!(!a.same_value(b.as_ref()));
        assert!(!a.same_value(other.as_ref()));
    }

    #[test]
    fn downcast_returns_concrete_value() {
        let a: EventRef = Arc::new(Plain(7));
        assert!(a.is::<Plain>());
        assert_eq!(a.downcast_ref::<Plain>(), Some(&Plain(7)));
        assert!(a.downcast_ref::<Other>().is_none());
    }

    #[test]
    fn defaults_are_neutral() {
        let a = Plain(1);
        assert_eq!(a.stickiness(), Stickiness::None);
        assert!(a.key().is_none());
        assert!(a.key_rule().is_none());
        assert!(!a.is_persistable());
    }

    #[test]
    fn keys_convert_from_primitives() {
        assert_eq!(EventKey::from(3u8), EventKey::Int(3));
        assert_eq!(EventKey::from(-4i32).as_int(), Some(-4));
        assert_eq!(EventKey::from("slot-a").as_str(), Some("slot-a"));
        assert_eq!(EventKey::from(String::from("x")), EventKey::from("x"));
    }
}
