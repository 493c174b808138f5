//! # Hierarchical state machine driver.
//!
//! [`StateMachine`] owns the current state and runs transitions and event
//! dispatch inline on its caller's task.
//!
//! ## Transition cascade
//! ```text
//! next_state(target, params)
//!   loop {
//!     target == current ─► stop
//!     hops > limit       ─► MachineError::CascadeLimit
//!     current.on_exit()
//!     current := target
//!     Normal    ─► on_enter(params); initial_transition() ─► Some(next) → target = next
//!                                                        └► None       → stop
//!     Transient ─► transition()                           ─► target = next
//!   }
//! ```
//!
//! ## Event dispatch
//! ```text
//! process_event(ev)
//!   state := current
//!   loop state.process_event(ev):
//!     Handled          ─► done
//!     TransitionTo     ─► next_state(..)
//!     Unhandled        ─► no parent                 → done (silently)
//!                         parent.parent == state    → MachineError::RecursiveHierarchy
//!                         otherwise                 → state := parent
//! ```
//!
//! ## Rules
//! - `initialize` runs once; a second call fails and leaves the machine untouched.
//! - The params of a transition are handed to every state entered by its cascade.
//! - Hook errors become [`MachineError::State`] naming the failing state.
//! - Events reaching a machine that was never initialized are dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace};

use super::context::Context;
use super::state::{Outcome, State, TransitionParams};
use crate::bus::EventBus;
use crate::error::MachineError;
use crate::events::EventRef;

/// Hierarchical state machine over services `S`.
pub struct StateMachine<S: Send + Sync + 'static> {
    name: Arc<str>,
    initial: State<S>,
    current: watch::Sender<State<S>>,
    ctx: Context<S>,
    initialized: bool,
    cascade_limit: Option<usize>,
}

impl<S: Send + Sync + 'static> StateMachine<S> {
    /// Creates a machine that will start in `initial` once initialized.
    ///
    /// The transition cascade limit is taken from the bus configuration.
    pub fn new(name: impl Into<String>, initial: State<S>, services: S, bus: &EventBus) -> Self {
        Self::with_services(name, initial, Arc::new(services), bus)
    }

    /// Same as [`new`](Self::new) with already shared services.
    pub fn with_services(
        name: impl Into<String>,
        initial: State<S>,
        services: Arc<S>,
        bus: &EventBus,
    ) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (current, rx) = watch::channel(initial.clone());
        let ctx = Context::new(Arc::clone(&name), services, bus.clone(), rx);
        Self {
            name,
            initial,
            current,
            ctx,
            initialized: false,
            cascade_limit: bus.config().cascade_limit(),
        }
    }

    /// Name of the machine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once [`initialize`](Self::initialize) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current state. Before initialization this is the initial state, not yet entered.
    pub fn current_state(&self) -> State<S> {
        self.current.borrow().clone()
    }

    /// Receiver following every change of the current state.
    pub fn current(&self) -> watch::Receiver<State<S>> {
        self.current.subscribe()
    }

    /// Context handed to state hooks.
    pub fn context(&self) -> &Context<S> {
        &self.ctx
    }

    /// Enters the initial state and follows its cascade.
    ///
    /// # Errors
    /// - [`MachineError::AlreadyInitialized`] on a second call; nothing changes.
    /// - Any error of the entered states' hooks.
    pub async fn initialize(&mut self) -> Result<(), MachineError> {
        if self.initialized {
            return Err(MachineError::AlreadyInitialized {
                machine: self.name.to_string(),
            });
        }
        self.initialized = true;
        debug!(machine = %self.name, state = self.initial.name(), "initializing");

        let initial = self.initial.clone();
        self.cascade(initial, None, false).await
    }

    /// Moves to `target`, then follows transient states and automatic transitions.
    ///
    /// A no-op when `target` is already current.
    pub async fn next_state(
        &mut self,
        target: State<S>,
        params: Option<TransitionParams>,
    ) -> Result<(), MachineError> {
        self.cascade(target, params, true).await
    }

    /// Dispatches `event` to the current state, bubbling unhandled events to parents.
    pub async fn process_event(&mut self, event: &EventRef) -> Result<(), MachineError> {
        if !self.initialized {
            debug!(machine = %self.name, event_type = %event.event_type(), "not initialized, event dropped");
            return Ok(());
        }
        let mut state = self.current_state();
        let mut hops = 0usize;

        loop {
            let outcome = match &state {
                State::Normal(s) => s
                    .process_event(event, &self.ctx)
                    .await
                    .map_err(|e| state_error(&state, e))?,
                State::Transient(_) => Outcome::Handled,
            };

            match outcome {
                Outcome::Handled => return Ok(()),
                Outcome::TransitionTo(target, params) => {
                    return self.next_state(target, params).await;
                }
                Outcome::Unhandled => {
                    let Some(parent) = state.parent() else {
                        trace!(
                            machine = %self.name,
                            state = state.name(),
                            event_type = %event.event_type(),
                            "event unhandled at root"
                        );
                        return Ok(());
                    };
                    if parent.parent().is_some_and(|gp| gp == state) {
                        return Err(MachineError::RecursiveHierarchy {
                            state: state.name().to_owned(),
                            parent: parent.name().to_owned(),
                        });
                    }
                    hops += 1;
                    self.check_limit(hops, &parent)?;
                    trace!(machine = %self.name, from = state.name(), to = parent.name(), "bubbling");
                    state = parent;
                }
            }
        }
    }

    fn check_limit(&self, hops: usize, at: &State<S>) -> Result<(), MachineError> {
        match self.cascade_limit {
            Some(limit) if hops > limit => Err(MachineError::CascadeLimit {
                limit,
                state: at.name().to_owned(),
            }),
            _ => Ok(()),
        }
    }

    async fn cascade(
        &mut self,
        mut target: State<S>,
        params: Option<TransitionParams>,
        mut leave_current: bool,
    ) -> Result<(), MachineError> {
        let mut hops = 0usize;
        loop {
            hops += 1;
            if leave_current {
                let current = self.current_state();
                if current == target {
                    trace!(machine = %self.name, state = target.name(), "already current");
                    return Ok(());
                }
                self.check_limit(hops, &target)?;
                exit(&current, &self.ctx).await?;
                debug!(machine = %self.name, from = current.name(), to = target.name(), "transition");
            }
            leave_current = true;

            self.current.send_replace(target.clone());
            match enter(&target, &self.ctx, params.as_ref()).await? {
                Some(next) => target = next,
                None => return Ok(()),
            }
        }
    }
}

impl<S: Send + Sync + 'static> std::fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("current", &self.current.borrow().name())
            .field("initialized", &self.initialized)
            .finish()
    }
}

fn state_error<S: Send + Sync + 'static>(state: &State<S>, source: anyhow::Error) -> MachineError {
    MachineError::State {
        state: state.name().to_owned(),
        source,
    }
}

/// Runs the enter side of `state`, returning the state it chains to.
async fn enter<S: Send + Sync + 'static>(
    state: &State<S>,
    ctx: &Context<S>,
    params: Option<&TransitionParams>,
) -> Result<Option<State<S>>, MachineError> {
    match state {
        State::Normal(s) => {
            s.on_enter(ctx, params)
                .await
                .map_err(|e| state_error(state, e))?;
            s.initial_transition(ctx)
                .await
                .map_err(|e| state_error(state, e))
        }
        State::Transient(s) => s
            .transition(ctx)
            .await
            .map(Some)
            .map_err(|e| state_error(state, e)),
    }
}

async fn exit<S: Send + Sync + 'static>(
    state: &State<S>,
    ctx: &Context<S>,
) -> Result<(), MachineError> {
    let res = match state {
        State::Normal(s) => s.on_exit(ctx).await,
        State::Transient(s) => s.on_exit(ctx).await,
    };
    res.map_err(|e| state_error(state, e))
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::events::Event;
    use crate::hsm::{NormalState, TransientState};

    #[derive(Debug, Clone, PartialEq)]
    struct Ping;
    impl Event for Ping {}

    #[derive(Debug, Clone, PartialEq)]
    struct Go;
    impl Event for Go {}

    /// Journal of hook calls, shared by all states through the services.
    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().push(entry.into());
        }
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    /// Normal state whose parent and reaction are set in the test.
    struct Node {
        name: &'static str,
        parent: OnceLock<State<Journal>>,
        on_go: OnceLock<State<Journal>>,
        handles_ping: bool,
        auto: OnceLock<State<Journal>>,
    }

    impl Node {
        fn new(name: &'static str, handles_ping: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                parent: OnceLock::new(),
                on_go: OnceLock::new(),
                handles_ping,
                auto: OnceLock::new(),
            })
        }
    }

    #[async_trait]
    impl NormalState<Journal> for Node {
        fn name(&self) -> &str {
            self.name
        }

        fn parent(&self) -> Option<State<Journal>> {
            self.parent.get().cloned()
        }

        async fn on_enter(
            &self,
            ctx: &Context<Journal>,
            params: Option<&TransitionParams>,
        ) -> anyhow::Result<()> {
            let p = params.and_then(|p| p.get::<u32>()).copied();
            ctx.services().push(format!("enter {} {:?}", self.name, p));
            Ok(())
        }

        async fn on_exit(&self, ctx: &Context<Journal>) -> anyhow::Result<()> {
            ctx.services().push(format!("exit {}", self.name));
            Ok(())
        }

        async fn initial_transition(
            &self,
            _ctx: &Context<Journal>,
        ) -> anyhow::Result<Option<State<Journal>>> {
            Ok(self.auto.get().cloned())
        }

        async fn process_event(
            &self,
            event: &EventRef,
            ctx: &Context<Journal>,
        ) -> anyhow::Result<Outcome<Journal>> {
            ctx.services().push(format!("process {}", self.name));
            if event.is::<Go>() {
                if let Some(target) = self.on_go.get() {
                    return Ok(Outcome::transition_with(
                        target.clone(),
                        TransitionParams::new(7u32),
                    ));
                }
            }
            if self.handles_ping && event.is::<Ping>() {
                return Ok(Outcome::Handled);
            }
            Ok(Outcome::Unhandled)
        }
    }

    struct Hop {
        to: State<Journal>,
    }

    #[async_trait]
    impl TransientState<Journal> for Hop {
        fn name(&self) -> &str {
            "hop"
        }

        async fn transition(&self, ctx: &Context<Journal>) -> anyhow::Result<State<Journal>> {
            ctx.services().push("transition hop");
            Ok(self.to.clone())
        }

        async fn on_exit(&self, ctx: &Context<Journal>) -> anyhow::Result<()> {
            ctx.services().push("exit hop");
            Ok(())
        }
    }

    fn machine(initial: State<Journal>) -> StateMachine<Journal> {
        StateMachine::new("test", initial, Journal::default(), &EventBus::new())
    }

    fn ping() -> EventRef {
        Arc::new(Ping)
    }

    #[tokio::test]
    async fn test_initialize_enters_initial_state_once() {
        let idle = Node::new("idle", true);
        let mut m = machine(State::Normal(idle));

        m.initialize().await.unwrap();
        assert_eq!(m.context().services().take(), vec!["enter idle None"]);

        let err = m.initialize().await.unwrap_err();
        assert!(matches!(err, MachineError::AlreadyInitialized { .. }));
        assert!(m.context().services().take().is_empty());
        assert_eq!(m.current_state().name(), "idle");
    }

    #[tokio::test]
    async fn test_events_before_initialize_are_dropped() {
        let idle = Node::new("idle", true);
        let mut m = machine(State::Normal(idle));

        m.process_event(&ping()).await.unwrap();
        assert!(m.context().services().take().is_empty());
        assert!(!m.is_initialized());
    }

    #[tokio::test]
    async fn test_unhandled_bubbles_child_to_parent() {
        let parent = Node::new("parent", true);
        let child = Node::new("child", false);
        let _ = child.parent.set(State::Normal(parent));
        let mut m = machine(State::Normal(child));
        m.initialize().await.unwrap();
        m.context().services().take();

        m.process_event(&ping()).await.unwrap();
        assert_eq!(
            m.context().services().take(),
            vec!["process child", "process parent"]
        );
        assert_eq!(m.current_state().name(), "child");
    }

    #[tokio::test]
    async fn test_unhandled_at_root_ends_silently() {
        let root = Node::new("root", false);
        let mut m = machine(State::Normal(root));
        m.initialize().await.unwrap();

        m.process_event(&ping()).await.unwrap();
        assert_eq!(m.current_state().name(), "root");
    }

    #[tokio::test]
    async fn test_unhandled_climbs_three_levels_then_ends_silently() {
        let grandparent = Node::new("grandparent", false);
        let parent = Node::new("parent", false);
        let child = Node::new("child", false);
        let _ = parent.parent.set(State::Normal(grandparent));
        let _ = child.parent.set(State::Normal(parent));
        let mut m = machine(State::Normal(child));
        m.initialize().await.unwrap();
        m.context().services().take();

        m.process_event(&ping()).await.unwrap();
        assert_eq!(
            m.context().services().take(),
            vec!["process child", "process parent", "process grandparent"]
        );
        assert_eq!(m.current_state().name(), "child");
    }

    #[tokio::test]
    async fn test_two_node_cycle_is_rejected() {
        let a = Node::new("a", false);
        let b = Node::new("b", false);
        let sa = State::Normal(a.clone() as Arc<dyn NormalState<Journal>>);
        let sb = State::Normal(b.clone() as Arc<dyn NormalState<Journal>>);
        let _ = a.parent.set(sb.clone());
        let _ = b.parent.set(sa.clone());

        let mut m = machine(sa);
        m.initialize().await.unwrap();
        let err = m.process_event(&ping()).await.unwrap_err();
        match err {
            MachineError::RecursiveHierarchy { state, parent } => {
                assert_eq!(state, "a");
                assert_eq!(parent, "b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transition_runs_exit_then_enter_with_params() {
        let idle = Node::new("idle", false);
        let busy = Node::new("busy", false);
        let _ = idle.on_go.set(State::Normal(busy));
        let mut m = machine(State::Normal(idle));
        m.initialize().await.unwrap();
        m.context().services().take();

        let mut watch = m.current();
        m.process_event(&(Arc::new(Go) as EventRef)).await.unwrap();
        assert_eq!(
            m.context().services().take(),
            vec!["process idle", "exit idle", "enter busy Some(7)"]
        );
        assert!(watch.has_changed().unwrap());
        assert_eq!(watch.borrow_and_update().name(), "busy");
    }

    #[tokio::test]
    async fn test_next_state_to_current_is_noop() {
        let idle = Node::new("idle", false);
        let state = State::Normal(idle as Arc<dyn NormalState<Journal>>);
        let mut m = machine(state.clone());
        m.initialize().await.unwrap();
        m.context().services().take();

        m.next_state(state, None).await.unwrap();
        assert!(m.context().services().take().is_empty());
    }

    #[tokio::test]
    async fn test_transient_and_auto_transitions_cascade() {
        let done = Node::new("done", false);
        let landing = Node::new("landing", false);
        let _ = landing.auto.set(State::Normal(done));
        let hop = State::transient(Hop {
            to: State::Normal(landing),
        });
        let start = Node::new("start", false);
        let _ = start.on_go.set(hop);

        let mut m = machine(State::Normal(start));
        m.initialize().await.unwrap();
        m.context().services().take();

        m.process_event(&(Arc::new(Go) as EventRef)).await.unwrap();
        assert_eq!(
            m.context().services().take(),
            vec![
                "process start",
                "exit start",
                "transition hop",
                "exit hop",
                "enter landing Some(7)",
                "exit landing",
                "enter done Some(7)",
            ]
        );
        assert_eq!(m.current_state().name(), "done");
    }

    #[tokio::test]
    async fn test_transient_processes_nothing() {
        struct Stuck;

        #[async_trait]
        impl TransientState<Journal> for Stuck {
            async fn transition(&self, ctx: &Context<Journal>) -> anyhow::Result<State<Journal>> {
                Ok(ctx.current_state())
            }
        }

        // A transient state naming itself stays current.
        let mut m = machine(State::transient(Stuck));
        m.initialize().await.unwrap();
        assert!(m.current_state().is_transient());
        m.process_event(&ping()).await.unwrap();
    }

    #[tokio::test]
    async fn test_cascade_limit_stops_endless_chain() {
        let a = Node::new("a", false);
        let b = Node::new("b", false);
        let sa = State::Normal(a.clone() as Arc<dyn NormalState<Journal>>);
        let sb = State::Normal(b.clone() as Arc<dyn NormalState<Journal>>);
        let _ = a.auto.set(sb.clone());
        let _ = b.auto.set(sa.clone());

        let bus = EventBus::with_config(RuntimeConfig {
            max_transition_cascade: 5,
            ..RuntimeConfig::default()
        });
        let mut m = StateMachine::new("loop", sa, Journal::default(), &bus);
        let err = m.initialize().await.unwrap_err();
        assert!(matches!(err, MachineError::CascadeLimit { limit: 5, .. }));
    }

    #[tokio::test]
    async fn test_hook_error_names_the_state() {
        struct Broken;

        #[async_trait]
        impl NormalState<Journal> for Broken {
            fn name(&self) -> &str {
                "broken"
            }

            async fn on_enter(
                &self,
                _: &Context<Journal>,
                _: Option<&TransitionParams>,
            ) -> anyhow::Result<()> {
                anyhow::bail!("no power")
            }

            async fn process_event(
                &self,
                _: &EventRef,
                _: &Context<Journal>,
            ) -> anyhow::Result<Outcome<Journal>> {
                Ok(Outcome::Handled)
            }
        }

        let mut m = machine(State::normal(Broken));
        match m.initialize().await.unwrap_err() {
            MachineError::State { state, source } => {
                assert_eq!(state, "broken");
                assert_eq!(source.to_string(), "no power");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
