//! # Default-value factories.
//!
//! A [`DefaultFactory`] is the last step of the sticky read fallback chain
//! (memory → persistence → default). Construction must be pure: a factory never
//! consults the bus.
//!
//! [`DefaultRegistry`] is a runtime map from event type to constructor:
//!
//! ```rust
//! use actorbus::{DefaultRegistry, Event, Stickiness};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Brightness(u8);
//! impl Event for Brightness {
//!     fn stickiness(&self) -> Stickiness { Stickiness::Sticky }
//! }
//!
//! let defaults = DefaultRegistry::new()
//!     .register::<Brightness>()
//!     .register_with(|| Brightness(80));
//! assert_eq!(defaults.len(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::NoDefaultError;
use crate::events::{Event, EventRef, EventType};

/// Produces default instances of event types.
pub trait DefaultFactory: Send + Sync + 'static {
    /// Builds the default instance of `ty`.
    ///
    /// Returns [`NoDefaultError`] if `ty` was never registered.
    fn create_default(&self, ty: EventType) -> Result<EventRef, NoDefaultError>;
}

/// Factory with no registered defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDefaults;

impl DefaultFactory for NoDefaults {
    fn create_default(&self, ty: EventType) -> Result<EventRef, NoDefaultError> {
        Err(NoDefaultError { event_type: ty })
    }
}

type Ctor = Arc<dyn Fn() -> EventRef + Send + Sync>;

/// Runtime map from event type to default constructor.
///
/// Registering a type twice replaces the previous constructor.
#[derive(Clone, Default)]
pub struct DefaultRegistry {
    ctors: HashMap<EventType, Ctor>,
}

impl DefaultRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E::default()` as the default of `E`.
    #[must_use]
    pub fn register<E: Event + Default>(self) -> Self {
        self.register_with(E::default)
    }

    /// Registers `ctor` as the default of `E`.
    #[must_use]
    pub fn register_with<E, F>(mut self, ctor: F) -> Self
    where
        E: Event,
        F: Fn() -> E + Send + Sync + 'static,
    {
        self.ctors
            .insert(EventType::of::<E>(), Arc::new(move || Arc::new(ctor()) as EventRef));
        self
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.ctors.len()
    }

    /// Returns `true` if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.ctors.is_empty()
    }
}

impl fmt::Debug for DefaultRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ctors.keys()).finish()
    }
}

impl DefaultFactory for DefaultRegistry {
    fn create_default(&self, ty: EventType) -> Result<EventRef, NoDefaultError> {
        self.ctors
            .get(&ty)
            .map(|ctor| ctor())
            .ok_or(NoDefaultError { event_type: ty })
    }
}
