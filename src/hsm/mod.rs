//! # Hierarchical state machines.
//!
//! An optional delegate for active objects: a tree of states with enter/exit
//! hooks, typed transition results and parent bubbling.
//!
//! - [`StateMachine`] owns the current state and drives transitions.
//! - [`State`] is a [`NormalState`] or a [`TransientState`].
//! - [`Outcome`] is what a state returns for one event.
//! - [`Context`] gives hooks the services, bus and current state.
//! - [`HsmObject`] runs a machine as an [`ActiveObject`](crate::ActiveObject).
//!
//! The machine runs inline on the caller's task: inside an active object it
//! inherits the object's one-at-a-time guarantee.

mod context;
mod machine;
mod object;
mod state;

pub use context::Context;
pub use machine::StateMachine;
pub use object::HsmObject;
pub use state::{NormalState, Outcome, State, TransientState, TransitionParams};
