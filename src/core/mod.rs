//! Runtime core: active objects and their startup orchestration.
//!
//! The public API from this module is [`ActiveObject`] (user behaviour),
//! [`ObjectHandle`] (its runtime) and [`AoManager`] (barrier startup).
//!
//! Internal modules:
//! - [`object`]: the behaviour trait and its hooks;
//! - [`filter`]: declared event types plus predicate;
//! - [`handle`]: mailbox, forwarder, consumer and dispose drain;
//! - [`group`]: per-object task group with cascading cancellation;
//! - [`manager`]: 3-phase barrier orchestrator.

mod filter;
mod group;
mod handle;
mod manager;
mod object;

pub use filter::EventFilter;
pub use handle::{Lifecycle, ObjectHandle};
pub use manager::{AoManager, Phase};
pub use object::ActiveObject;
