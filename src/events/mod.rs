//! Bus events: data model, key rules and lifecycle control events.
//!
//! ## Contents
//! - [`Event`], [`EventRef`], [`EventType`], [`EventKey`], [`Stickiness`]: the capability-tagged event model
//! - [`KeyRule`]: built-in key-format rules for keyed events
//! - [`SubscriptionComplete`], [`InitPhaseTwoDone`], [`InitializationComplete`], [`DisposeObjects`]:
//!   control events exchanged between active objects and the orchestrator
//! - [`ObjectTag`]: identity of an object inside the startup barrier
//!
//! See `bus/mod.rs` for how the bus acts on each capability.

mod control;
mod event;
mod key_rule;

pub use control::{
    is_reserved, DisposeObjects, InitPhaseTwoDone, InitializationComplete, ObjectTag,
    SubscriptionComplete,
};
pub use event::{Event, EventKey, EventObject, EventRef, EventType, Stickiness};
pub use key_rule::KeyRule;
