//! # States, outcomes and transition parameters.
//!
//! A [`State`] is either:
//! - **Normal** ([`NormalState`]): optional parent, enter/exit hooks, optional
//!   automatic transition after enter, and event processing.
//! - **Transient** ([`TransientState`]): leaves immediately on enter through its
//!   single mandatory transition and never processes events.
//!
//! State identity is the allocation: two `State` values are equal when they
//! point to the same `Arc`.
//!
//! ## Processing outcomes
//! ```text
//! process_event(ev) ─► Handled                 done
//!                   ─► TransitionTo(s, params) machine.next_state(s, params)
//!                   ─► Unhandled               re-dispatch to parent (if any)
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::Context;
use crate::events::EventRef;

/// Opaque payload handed from a transition to the entered state.
#[derive(Clone)]
pub struct TransitionParams(Arc<dyn Any + Send + Sync>);

impl TransitionParams {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrows the value if it has type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for TransitionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransitionParams(..)")
    }
}

/// Result of processing one event in one state.
pub enum Outcome<S> {
    /// Event consumed, nothing else happens.
    Handled,
    /// Move the machine to another state.
    TransitionTo(State<S>, Option<TransitionParams>),
    /// Let the parent state process the event.
    Unhandled,
}

impl<S> Outcome<S> {
    /// Transition without parameters.
    pub fn transition(state: State<S>) -> Self {
        Outcome::TransitionTo(state, None)
    }

    /// Transition carrying `params` to the entered state.
    pub fn transition_with(state: State<S>, params: TransitionParams) -> Self {
        Outcome::TransitionTo(state, Some(params))
    }
}

impl<S: Send + Sync + 'static> fmt::Debug for Outcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Handled => f.write_str("Handled"),
            Outcome::TransitionTo(s, _) => write!(f, "TransitionTo({})", s.name()),
            Outcome::Unhandled => f.write_str("Unhandled"),
        }
    }
}

/// Behaviour of a normal state.
///
/// Every method but [`process_event`](NormalState::process_event) has a no-op default.
#[async_trait]
pub trait NormalState<S: Send + Sync + 'static>: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Parent receiving events this state leaves unhandled.
    fn parent(&self) -> Option<State<S>> {
        None
    }

    /// Runs when the state becomes current.
    async fn on_enter(
        &self,
        _ctx: &Context<S>,
        _params: Option<&TransitionParams>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs when the state stops being current.
    async fn on_exit(&self, _ctx: &Context<S>) -> anyhow::Result<()> {
        Ok(())
    }

    /// State to move to right after `on_enter`, if any.
    async fn initial_transition(&self, _ctx: &Context<S>) -> anyhow::Result<Option<State<S>>> {
        Ok(None)
    }

    /// Processes one event.
    async fn process_event(&self, event: &EventRef, ctx: &Context<S>) -> anyhow::Result<Outcome<S>>;
}

/// Behaviour of a transient state.
///
/// Entering it immediately performs [`transition`](TransientState::transition);
/// it never processes events.
#[async_trait]
pub trait TransientState<S: Send + Sync + 'static>: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The mandatory transition taken on enter.
    async fn transition(&self, ctx: &Context<S>) -> anyhow::Result<State<S>>;

    /// Runs when the state is left.
    async fn on_exit(&self, _ctx: &Context<S>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A state of a [`StateMachine`](crate::StateMachine).
pub enum State<S> {
    /// State processing events.
    Normal(Arc<dyn NormalState<S>>),
    /// State leaving on enter.
    Transient(Arc<dyn TransientState<S>>),
}

impl<S: Send + Sync + 'static> State<S> {
    /// Wraps a normal state.
    pub fn normal(state: impl NormalState<S>) -> Self {
        State::Normal(Arc::new(state))
    }

    /// Wraps a transient state.
    pub fn transient(state: impl TransientState<S>) -> Self {
        State::Transient(Arc::new(state))
    }

    /// Name of the state.
    pub fn name(&self) -> &str {
        match self {
            State::Normal(s) => s.name(),
            State::Transient(s) => s.name(),
        }
    }

    /// Declared parent; transient states have none.
    pub fn parent(&self) -> Option<State<S>> {
        match self {
            State::Normal(s) => s.parent(),
            State::Transient(_) => None,
        }
    }

    /// Returns `true` for transient states.
    pub fn is_transient(&self) -> bool {
        matches!(self, State::Transient(_))
    }
}

impl<S> State<S> {
    fn addr(&self) -> *const () {
        match self {
            State::Normal(s) => Arc::as_ptr(s) as *const (),
            State::Transient(s) => Arc::as_ptr(s) as *const (),
        }
    }
}

impl<S> Clone for State<S> {
    fn clone(&self) -> Self {
        match self {
            State::Normal(s) => State::Normal(Arc::clone(s)),
            State::Transient(s) => State::Transient(Arc::clone(s)),
        }
    }
}

impl<S> PartialEq for State<S> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<S> Eq for State<S> {}

impl<S: Send + Sync + 'static> fmt::Debug for State<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Normal(_) => write!(f, "Normal({})", self.name()),
            State::Transient(_) => write!(f, "Transient({})", self.name()),
        }
    }
}
