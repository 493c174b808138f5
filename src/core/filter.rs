//! Event filter declared by each active object.
//!
//! The forwarder consults the filter for every broadcast event; only admitted
//! events (plus the reserved control events) reach the mailbox.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::events::{Event, EventType};

type Predicate = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// Declared set of subscribed types plus an optional predicate.
///
/// An event is admitted if its type is declared **or** the predicate accepts it.
///
/// ```rust
/// use actorbus::{Event, EventFilter};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Ping;
/// impl Event for Ping {}
///
/// let filter = EventFilter::new().with::<Ping>();
/// assert!(filter.allows(&Ping));
/// ```
#[derive(Clone, Default)]
pub struct EventFilter {
    types: HashSet<EventType>,
    predicate: Option<Predicate>,
}

impl EventFilter {
    /// Filter admitting nothing but reserved control events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `E` as subscribed.
    #[must_use]
    pub fn with<E: Event>(mut self) -> Self {
        self.types.insert(EventType::of::<E>());
        self
    }

    /// Declares a type tag as subscribed.
    #[must_use]
    pub fn with_type(mut self, ty: EventType) -> Self {
        self.types.insert(ty);
        self
    }

    /// Adds a predicate admitting events outside the declared set.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Declared types.
    pub fn types(&self) -> impl Iterator<Item = &EventType> {
        self.types.iter()
    }

    /// Returns `true` if the event is admitted.
    pub fn allows(&self, event: &dyn Event) -> bool {
        self.types.contains(&event.event_type())
            || self.predicate.as_ref().is_some_and(|p| p(event))
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("types", &self.types)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping;
    impl Event for Ping {}

    #[derive(Debug, Clone, PartialEq)]
    struct Level(u8);
    impl Event for Level {}

    #[test]
    fn test_declared_types_are_admitted() {
        let f = EventFilter::new().with::<Ping>();
        assert!(f.allows(&Ping));
        assert!(!f.allows(&Level(1)));
        assert_eq!(f.types().count(), 1);
    }

    #[test]
    fn test_predicate_extends_declared_set() {
        let f = EventFilter::new()
            .with::<Ping>()
            .with_predicate(|e| e.downcast_ref::<Level>().is_some_and(|l| l.0 > 5));
        assert!(f.allows(&Ping));
        assert!(f.allows(&Level(9)));
        assert!(!f.allows(&Level(2)));
    }
}
