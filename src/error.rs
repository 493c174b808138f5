//! Error types used by the bus, active objects and state machines.
//!
//! This module defines:
//!
//! - [`BusError`]: errors returned by [`EventBus`](crate::EventBus) operations.
//! - [`NoDefaultError`]: raised by a default factory for an unregistered type.
//! - [`ObjectError`]: errors routed to an active object's `handle_error` hook.
//! - [`MachineError`]: errors raised by a [`StateMachine`](crate::StateMachine).
//!
//! All enums provide `as_label` for logs. User hooks return `anyhow::Result`;
//! the runtime wraps those failures into the typed variants here.

use thiserror::Error;

use crate::events::{EventKey, EventType, KeyRule};

/// # Errors produced by the event bus.
///
/// Validation and key-format failures reject a publish before any side effect.
/// Persistence failures surface to the caller after the event was broadcast.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The event's own validator rejected it.
    #[error("event {event_type} rejected: {source}")]
    Validation {
        /// Type of the rejected event.
        event_type: EventType,
        /// Error returned by the validator.
        source: anyhow::Error,
    },

    /// The key does not satisfy the cached rule of its type.
    #[error("key {key} of {event_type} violates rule {rule}")]
    KeyFormat {
        /// Type of the offending event.
        event_type: EventType,
        /// Offending key.
        key: EventKey,
        /// Rule the key was checked against.
        rule: KeyRule,
    },

    /// A sticky-collection event was published without a key.
    #[error("collection event {event_type} carries no key")]
    MissingKey {
        /// Type of the offending event.
        event_type: EventType,
    },

    /// Neither memory, persistence nor the default factory produced a value.
    #[error(transparent)]
    NoDefault(#[from] NoDefaultError),

    /// A collaborator returned an event of another type than requested.
    #[error("expected {expected}, collaborator returned {found}")]
    TypeMismatch {
        /// Requested type.
        expected: EventType,
        /// Type actually returned.
        found: EventType,
    },

    /// The persistence registry failed.
    #[error("persistence of {event_type} failed: {source}")]
    Persistence {
        /// Type involved in the failed call.
        event_type: EventType,
        /// Error returned by the registry.
        source: anyhow::Error,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use actorbus::{BusError, EventType};
    ///
    /// let err = BusError::MissingKey { event_type: EventType::of::<u8>() };
    /// assert_eq!(err.as_label(), "bus_missing_key");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Validation { .. } => "bus_validation",
            BusError::KeyFormat { .. } => "bus_key_format",
            BusError::MissingKey { .. } => "bus_missing_key",
            BusError::NoDefault(_) => "bus_no_default",
            BusError::TypeMismatch { .. } => "bus_type_mismatch",
            BusError::Persistence { .. } => "bus_persistence",
        }
    }

    /// Type of the event involved in the failure.
    pub fn event_type(&self) -> EventType {
        match self {
            BusError::Validation { event_type, .. }
            | BusError::KeyFormat { event_type, .. }
            | BusError::MissingKey { event_type }
            | BusError::Persistence { event_type, .. } => *event_type,
            BusError::NoDefault(e) => e.event_type,
            BusError::TypeMismatch { expected, .. } => *expected,
        }
    }
}

/// The default factory has no constructor for the requested type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no default value registered for {event_type}")]
pub struct NoDefaultError {
    /// Requested type.
    pub event_type: EventType,
}

/// # Errors observed by an active object.
///
/// Every failure inside an object's forwarding task or mailbox loop is wrapped
/// into one of these and handed to `ActiveObject::handle_error`. If the hook
/// returns it, the object stops.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ObjectError {
    /// `subscribe` was called a second time.
    #[error("object {object} is already subscribed")]
    AlreadySubscribed {
        /// Name of the object.
        object: String,
    },

    /// A bus call made by the runtime on behalf of the object failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The object's state machine failed.
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// A user hook returned an error.
    #[error("handler failed: {0}")]
    Handler(anyhow::Error),

    /// The forwarder fell behind the broadcast ring and skipped events.
    #[error("mailbox forwarder lagged, {0} events skipped")]
    Lagged(u64),

    /// A user hook panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The object was disposed before the barrier completed.
    #[error("object {object} stopped before startup completed")]
    Stopped {
        /// Name of the object.
        object: String,
    },
}

impl ObjectError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ObjectError::AlreadySubscribed { .. } => "object_already_subscribed",
            ObjectError::Bus(_) => "object_bus",
            ObjectError::Machine(_) => "object_machine",
            ObjectError::Handler(_) => "object_handler",
            ObjectError::Lagged(_) => "object_lagged",
            ObjectError::Panicked(_) => "object_panicked",
            ObjectError::Stopped { .. } => "object_stopped",
        }
    }
}

/// # Errors produced by a state machine.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MachineError {
    /// `initialize` was called a second time.
    #[error("state machine {machine} is already initialized")]
    AlreadyInitialized {
        /// Name of the machine.
        machine: String,
    },

    /// Two states declare each other as parent.
    #[error("state {state} and its parent {parent} form a cycle")]
    RecursiveHierarchy {
        /// State that returned `Unhandled`.
        state: String,
        /// Its parent, whose own parent is `state`.
        parent: String,
    },

    /// A single transition kept chaining past the configured limit.
    #[error("transition chain exceeded {limit} hops at {state}")]
    CascadeLimit {
        /// Configured limit.
        limit: usize,
        /// State reached when the limit hit.
        state: String,
    },

    /// A state hook returned an error.
    #[error("state {state} failed: {source}")]
    State {
        /// State whose hook failed.
        state: String,
        /// Error returned by the hook.
        source: anyhow::Error,
    },
}

impl MachineError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use actorbus::MachineError;
    ///
    /// let err = MachineError::AlreadyInitialized { machine: "door".into() };
    /// assert_eq!(err.as_label(), "machine_already_initialized");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            MachineError::AlreadyInitialized { .. } => "machine_already_initialized",
            MachineError::RecursiveHierarchy { .. } => "machine_recursive_hierarchy",
            MachineError::CascadeLimit { .. } => "machine_cascade_limit",
            MachineError::State { .. } => "machine_state",
        }
    }

    /// Indicates a misconfiguration rather than a runtime failure.
    ///
    /// Returns `true` for [`MachineError::AlreadyInitialized`],
    /// [`MachineError::RecursiveHierarchy`] and [`MachineError::CascadeLimit`].
    pub fn is_programming_error(&self) -> bool {
        !matches!(self, MachineError::State { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let ty = EventType::of::<u32>();
        assert_eq!(
            BusError::NoDefault(NoDefaultError { event_type: ty }).as_label(),
            "bus_no_default"
        );
        assert_eq!(ObjectError::Lagged(3).as_label(), "object_lagged");
        assert_eq!(
            ObjectError::Stopped { object: "o".into() }.as_label(),
            "object_stopped"
        );
        assert_eq!(
            MachineError::CascadeLimit { limit: 1, state: "a".into() }.as_label(),
            "machine_cascade_limit"
        );
    }

    #[test]
    fn test_key_format_message_names_type_key_and_rule() {
        let err = BusError::KeyFormat {
            event_type: EventType::of::<u32>(),
            key: EventKey::Int(9),
            rule: KeyRule::ItemsRange { min: 1, max: 4 },
        };
        let msg = err.to_string();
        assert!(msg.contains("u32"));
        assert!(msg.contains('9'));
        assert!(msg.contains("ItemsRange(1..=4)"));
        assert_eq!(err.event_type(), EventType::of::<u32>());
    }

    #[test]
    fn test_state_errors_are_not_programming_errors() {
        let err = MachineError::State {
            state: "idle".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert!(!err.is_programming_error());
        assert!(MachineError::AlreadyInitialized { machine: "m".into() }.is_programming_error());
    }
}
