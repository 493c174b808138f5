//! # Control events for lifecycle coordination.
//!
//! These events travel over the same bus as application events and are the only
//! channel between an active object and the orchestrator.
//!
//! ```text
//! object.subscribe()                 ──► SubscriptionComplete { object }
//! object.do_internal_initialization()──► InitPhaseTwoDone { object }
//! orchestrator (Ready phase)         ──► InitializationComplete
//! application                        ──► DisposeObjects
//! ```
//!
//! [`InitializationComplete`] and [`DisposeObjects`] are **reserved**: every
//! subscribed object receives them regardless of its declared filter.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

use super::event::{Event, EventType};

/// Identity of an active object inside the startup barrier.
///
/// Derived from the concrete behaviour type, optionally refined by a label.
/// Two objects with equal tags are indistinguishable to the orchestrator.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectTag {
    id: TypeId,
    name: Cow<'static, str>,
}

impl ObjectTag {
    /// Tag of the type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: Cow::Borrowed(std::any::type_name::<T>()),
        }
    }

    /// Tag of the type `T` refined by `label`.
    ///
    /// Use it to register several objects sharing one behaviour type.
    pub fn labelled<T: ?Sized + 'static>(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: label.into(),
        }
    }

    /// Human-readable name of the tag.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ObjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for ObjectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Published by an object once its bus forwarding is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionComplete {
    /// Object that finished subscribing.
    pub object: ObjectTag,
}

impl Event for SubscriptionComplete {}

/// Published by an object after it has published its initial events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitPhaseTwoDone {
    /// Object that finished phase two.
    pub object: ObjectTag,
}

impl Event for InitPhaseTwoDone {}

/// Published by the orchestrator once every object processes events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitializationComplete;

impl Event for InitializationComplete {}

/// Asks every subscribed object to drain its mailbox and shut down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeObjects;

impl Event for DisposeObjects {}

/// Returns `true` for control events that bypass object filters.
#[inline]
pub fn is_reserved(ty: EventType) -> bool {
    ty == EventType::of::<InitializationComplete>() || ty == EventType::of::<DisposeObjects>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_tags_follow_type_and_label() {
        assert_eq!(ObjectTag::of::<Alpha>(), ObjectTag::of::<Alpha>());
        assert_ne!(ObjectTag::of::<Alpha>(), ObjectTag::of::<Beta>());
        assert_ne!(
            ObjectTag::labelled::<Alpha>("left"),
            ObjectTag::labelled::<Alpha>("right")
        );
        assert_eq!(ObjectTag::labelled::<Alpha>("left").name(), "left");
    }

    #[test]
    fn test_only_lifecycle_broadcasts_are_reserved() {
        assert!(is_reserved(EventType::of::<InitializationComplete>()));
        assert!(is_reserved(EventType::of::<DisposeObjects>()));
        assert!(!is_reserved(EventType::of::<SubscriptionComplete>()));
        assert!(!is_reserved(EventType::of::<InitPhaseTwoDone>()));
    }
}
