//! # AoManager: barrier startup of a set of active objects.
//!
//! The manager is itself an active object. Its behaviour is a state machine
//! with one state per startup phase, all children of a common `startup` root.
//!
//! ```text
//! start_initialization()
//!   manager.subscribe()              (silent: no SubscriptionComplete)
//!   manager.start_event_processing()
//!   machine.initialize()
//!        │
//!        ▼
//! ┌───────────────────────────┐ on_enter: pending = all tags; obj.subscribe() for each
//! │ CollectingSubscriptions   │ SubscriptionComplete(tag) → pending.remove(tag)
//! └────────────┬──────────────┘ pending empty
//!              ▼
//! ┌───────────────────────────┐ on_enter: pending = all tags; obj.do_internal_initialization()
//! │ CollectingInit            │ InitPhaseTwoDone(tag) → pending.remove(tag)
//! └────────────┬──────────────┘ pending empty
//!              ▼
//! ┌───────────────────────────┐ on_enter: obj.start_event_processing() for each,
//! │ Ready                     │           then publish InitializationComplete
//! └───────────────────────────┘
//!
//! acknowledgements a phase does not expect bubble to `startup`, which logs and drops them
//! ```
//!
//! ## Rules
//! - No object consumes a non-control event before every object subscribed and
//!   published its initial events.
//! - Pending sets are keyed by [`ObjectTag`]; objects sharing a tag cannot be
//!   told apart. The manager warns about duplicates at construction.
//! - An object (or the manager) that stops before `Ready` aborts the wait:
//!   [`AoManager::wait_ready`] returns its error instead of blocking forever.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, FutureExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::filter::EventFilter;
use super::handle::{Lifecycle, ObjectHandle};
use super::object::ActiveObject;
use crate::bus::EventBus;
use crate::error::ObjectError;
use crate::events::{
    EventRef, InitPhaseTwoDone, InitializationComplete, ObjectTag, SubscriptionComplete,
};
use crate::hsm::{Context, NormalState, Outcome, State, StateMachine, TransitionParams};

/// Startup phase of an [`AoManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// `start_initialization` not called yet.
    Idle,
    /// Waiting for every `SubscriptionComplete`.
    CollectingSubscriptions,
    /// Waiting for every `InitPhaseTwoDone`.
    CollectingInit,
    /// Every object runs; `InitializationComplete` was published.
    Ready,
}

impl Phase {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::CollectingSubscriptions => "collecting_subscriptions",
            Phase::CollectingInit => "collecting_init",
            Phase::Ready => "ready",
        }
    }
}

/// Services shared by the phase states.
struct Barrier {
    objects: Vec<ObjectHandle>,
    phase: watch::Sender<Phase>,
}

impl Barrier {
    fn enter_phase(&self, phase: Phase) {
        info!(phase = phase.as_label(), objects = self.objects.len(), "startup phase");
        self.phase.send_replace(phase);
    }

    fn tags(&self) -> HashSet<ObjectTag> {
        self.objects.iter().map(|o| o.tag().clone()).collect()
    }
}

/// Root of the phase states; swallows stray acknowledgements.
struct Startup;

#[async_trait]
impl NormalState<Barrier> for Startup {
    fn name(&self) -> &str {
        "startup"
    }

    async fn process_event(&self, ev: &EventRef, ctx: &Context<Barrier>) -> anyhow::Result<Outcome<Barrier>> {
        debug!(
            phase = ctx.current_state().name(),
            event_type = %ev.event_type(),
            "stray acknowledgement dropped"
        );
        Ok(Outcome::Handled)
    }
}

/// Which acknowledgement a collecting phase waits for.
#[derive(Clone, Copy)]
enum Ack {
    Subscribed,
    Initialized,
}

impl Ack {
    fn object<'a>(&self, ev: &'a EventRef) -> Option<&'a ObjectTag> {
        match self {
            Ack::Subscribed => ev.downcast_ref::<SubscriptionComplete>().map(|e| &e.object),
            Ack::Initialized => ev.downcast_ref::<InitPhaseTwoDone>().map(|e| &e.object),
        }
    }
}

/// Phase collecting one acknowledgement per object.
struct Collecting {
    name: &'static str,
    phase: Phase,
    ack: Ack,
    pending: Mutex<HashSet<ObjectTag>>,
    parent: State<Barrier>,
    next: State<Barrier>,
}

#[async_trait]
impl NormalState<Barrier> for Collecting {
    fn name(&self) -> &str {
        self.name
    }

    fn parent(&self) -> Option<State<Barrier>> {
        Some(self.parent.clone())
    }

    async fn on_enter(
        &self,
        ctx: &Context<Barrier>,
        _params: Option<&TransitionParams>,
    ) -> anyhow::Result<()> {
        let barrier = ctx.services();
        *self.pending.lock() = barrier.tags();
        barrier.enter_phase(self.phase);

        for object in &barrier.objects {
            match self.ack {
                Ack::Subscribed => object.subscribe().await?,
                Ack::Initialized => object.do_internal_initialization(),
            }
        }
        Ok(())
    }

    async fn initial_transition(
        &self,
        _ctx: &Context<Barrier>,
    ) -> anyhow::Result<Option<State<Barrier>>> {
        // Only reachable without objects: acknowledgements wait for the manager's lock.
        if self.pending.lock().is_empty() {
            return Ok(Some(self.next.clone()));
        }
        Ok(None)
    }

    async fn process_event(
        &self,
        ev: &EventRef,
        _ctx: &Context<Barrier>,
    ) -> anyhow::Result<Outcome<Barrier>> {
        let Some(tag) = self.ack.object(ev) else {
            return Ok(Outcome::Unhandled);
        };

        let mut pending = self.pending.lock();
        if !pending.remove(tag) {
            debug!(phase = self.phase.as_label(), object = %tag, "acknowledgement from unknown object");
            return Ok(Outcome::Handled);
        }
        debug!(phase = self.phase.as_label(), object = %tag, left = pending.len(), "acknowledged");
        if pending.is_empty() {
            return Ok(Outcome::transition(self.next.clone()));
        }
        Ok(Outcome::Handled)
    }
}

/// Final phase: releases every mailbox and announces completion.
struct Ready {
    parent: State<Barrier>,
}

#[async_trait]
impl NormalState<Barrier> for Ready {
    fn name(&self) -> &str {
        "ready"
    }

    fn parent(&self) -> Option<State<Barrier>> {
        Some(self.parent.clone())
    }

    async fn on_enter(
        &self,
        ctx: &Context<Barrier>,
        _params: Option<&TransitionParams>,
    ) -> anyhow::Result<()> {
        let barrier = ctx.services();
        for object in &barrier.objects {
            object.start_event_processing();
        }
        ctx.bus().publish(InitializationComplete).await?;
        barrier.enter_phase(Phase::Ready);
        Ok(())
    }

    async fn process_event(
        &self,
        _ev: &EventRef,
        _ctx: &Context<Barrier>,
    ) -> anyhow::Result<Outcome<Barrier>> {
        Ok(Outcome::Unhandled)
    }
}

fn phases() -> State<Barrier> {
    let root = State::normal(Startup);
    let ready = State::normal(Ready {
        parent: root.clone(),
    });
    let init = State::normal(Collecting {
        name: "collecting_init",
        phase: Phase::CollectingInit,
        ack: Ack::Initialized,
        pending: Mutex::new(HashSet::new()),
        parent: root.clone(),
        next: ready,
    });
    State::normal(Collecting {
        name: "collecting_subscriptions",
        phase: Phase::CollectingSubscriptions,
        ack: Ack::Subscribed,
        pending: Mutex::new(HashSet::new()),
        parent: root,
        next: init,
    })
}

/// Behaviour of the manager object.
struct Orchestrator {
    machine: StateMachine<Barrier>,
}

#[async_trait]
impl ActiveObject for Orchestrator {
    fn tag(&self) -> ObjectTag {
        ObjectTag::of::<AoManager>()
    }

    fn filter(&self) -> EventFilter {
        EventFilter::new()
            .with::<SubscriptionComplete>()
            .with::<InitPhaseTwoDone>()
    }

    async fn on_event(&mut self, event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
        self.machine.process_event(&event).await?;
        Ok(())
    }
}

/// Orchestrator bringing a set of active objects from registered to running in lock-step.
///
/// ```rust,no_run
/// use actorbus::{AoManager, EventBus, ObjectHandle};
///
/// # async fn run(objects: Vec<ObjectHandle>) -> anyhow::Result<()> {
/// let bus = EventBus::new();
/// let manager = AoManager::new(objects, &bus);
/// manager.start_initialization().await?;
/// manager.wait_ready().await?;
/// # Ok(())
/// # }
/// ```
pub struct AoManager {
    handle: ObjectHandle,
    objects: Vec<ObjectHandle>,
    behavior: Arc<AsyncMutex<Orchestrator>>,
    phase: watch::Receiver<Phase>,
}

impl AoManager {
    /// Creates a manager for `objects`, all bound to `bus`.
    pub fn new(objects: Vec<ObjectHandle>, bus: &EventBus) -> Self {
        let mut seen = HashSet::new();
        for object in &objects {
            if !seen.insert(object.tag().clone()) {
                warn!(object = object.name(), tag = %object.tag(), "duplicate object tag");
            }
        }

        let (phase_tx, phase) = watch::channel(Phase::Idle);
        let barrier = Barrier {
            objects: objects.clone(),
            phase: phase_tx,
        };
        let machine = StateMachine::new("ao_manager", phases(), barrier, bus);
        let (handle, behavior) = ObjectHandle::wrap(Orchestrator { machine }, bus, false);
        Self {
            handle,
            objects,
            behavior,
            phase,
        }
    }

    /// Starts the barrier protocol.
    ///
    /// Returns once the first phase was entered; the rest is driven by
    /// acknowledgements on the bus. Use [`wait_ready`](Self::wait_ready) to
    /// wait for the end.
    ///
    /// # Errors
    /// - [`ObjectError::AlreadySubscribed`] if called twice.
    /// - [`ObjectError::Machine`] if subscribing an object failed.
    pub async fn start_initialization(&self) -> Result<(), ObjectError> {
        self.handle.subscribe().await?;
        self.handle.start_event_processing();

        let mut orchestrator = self.behavior.lock().await;
        orchestrator.machine.initialize().await?;
        Ok(())
    }

    /// Handle of the manager's own object.
    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Waits until every object runs and `InitializationComplete` was published.
    ///
    /// # Errors
    /// Returns as soon as the manager or one of its objects reaches a terminal
    /// lifecycle before [`Phase::Ready`]:
    /// - the fatal error of a [`Lifecycle::Failed`] object;
    /// - [`ObjectError::Stopped`] for a disposed one.
    pub async fn wait_ready(&self) -> Result<(), Arc<ObjectError>> {
        let mut phase = self.phase.clone();
        let any_stopped = future::select_all(
            std::iter::once(&self.handle)
                .chain(&self.objects)
                .map(|h| stopped(h.clone()).boxed()),
        );

        tokio::select! {
            biased;
            ready = phase.wait_for(|p| *p == Phase::Ready).map(|r| r.is_ok()) => {
                if ready {
                    return Ok(());
                }
                // The phase sender lives as long as the manager.
                Err(Arc::new(ObjectError::Stopped { object: self.handle.name().to_owned() }))
            }
            (object, _, _) = any_stopped => {
                if self.phase() == Phase::Ready {
                    return Ok(());
                }
                warn!(object = object.name(), "object stopped before startup completed");
                match object.lifecycle() {
                    Lifecycle::Failed(err) => Err(err),
                    _ => Err(Arc::new(ObjectError::Stopped { object: object.name().to_owned() })),
                }
            }
        }
    }
}

impl std::fmt::Debug for AoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AoManager")
            .field("phase", &self.phase())
            .field("handle", &self.handle)
            .finish()
    }
}

/// Resolves with `handle` once it is disposed or failed.
async fn stopped(handle: ObjectHandle) -> ObjectHandle {
    let mut rx = handle.watch_lifecycle();
    let _ = rx.wait_for(Lifecycle::is_terminal).await;
    handle
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::events::{DisposeObjects, Event};

    struct Quiet;

    #[async_trait]
    impl ActiveObject for Quiet {
        fn filter(&self) -> EventFilter {
            EventFilter::new()
        }

        async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Blocks its initial events until released.
    struct Stuck(Arc<Notify>);

    #[async_trait]
    impl ActiveObject for Stuck {
        fn filter(&self) -> EventFilter {
            EventFilter::new()
        }

        async fn publish_initial_events(&mut self, _bus: &EventBus) -> anyhow::Result<()> {
            self.0.notified().await;
            Ok(())
        }

        async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl ActiveObject for Broken {
        fn filter(&self) -> EventFilter {
            EventFilter::new()
        }

        async fn publish_initial_events(&mut self, _bus: &EventBus) -> anyhow::Result<()> {
            anyhow::bail!("no initial state")
        }

        async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Noise;
    impl Event for Noise {}

    #[tokio::test]
    async fn test_empty_manager_goes_straight_to_ready() {
        let bus = EventBus::new();
        let mut rx = bus.receiver();
        let manager = AoManager::new(Vec::new(), &bus);
        assert_eq!(manager.phase(), Phase::Idle);

        manager.start_initialization().await.unwrap();
        assert_eq!(manager.phase(), Phase::Ready);
        let ev = rx.recv().await.unwrap();
        assert!(ev.is::<InitializationComplete>());
    }

    #[tokio::test]
    async fn test_manager_does_not_announce_itself() {
        let bus = EventBus::new();
        let mut rx = bus.receiver();
        let manager = AoManager::new(vec![ObjectHandle::new(Quiet, &bus)], &bus);
        manager.start_initialization().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
            .await
            .expect("ready")
            .unwrap();

        let mut subscribed = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let Some(sc) = ev.downcast_ref::<SubscriptionComplete>() {
                subscribed.push(sc.object.clone());
            }
        }
        assert_eq!(subscribed, vec![ObjectTag::of::<Quiet>()]);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let bus = EventBus::new();
        let manager = AoManager::new(vec![ObjectHandle::new(Quiet, &bus)], &bus);
        manager.start_initialization().await.unwrap();
        let err = manager.start_initialization().await.unwrap_err();
        assert!(matches!(err, ObjectError::AlreadySubscribed { .. }));
    }

    #[tokio::test]
    async fn test_stray_events_do_not_advance_phases() {
        let bus = EventBus::new();
        let quiet = ObjectHandle::new(Quiet, &bus);
        let manager = AoManager::new(vec![quiet], &bus);
        manager.start_initialization().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
            .await
            .expect("ready")
            .unwrap();

        // Late acknowledgements bubble to the root and are dropped.
        bus.publish(SubscriptionComplete {
            object: ObjectTag::of::<Quiet>(),
        })
        .await
        .unwrap();
        bus.publish(Noise).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.phase(), Phase::Ready);
        assert!(!manager.handle().lifecycle().is_terminal());
    }

    #[tokio::test]
    async fn test_wait_ready_returns_when_manager_is_disposed_early() {
        let bus = EventBus::new();
        let release = Arc::new(Notify::new());
        let stuck = ObjectHandle::new(Stuck(release.clone()), &bus);
        let manager = AoManager::new(vec![stuck], &bus);
        manager.start_initialization().await.unwrap();

        bus.publish(DisposeObjects).await.unwrap();
        let err = tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
            .await
            .expect("wait_ready returns")
            .unwrap_err();
        assert!(matches!(*err, ObjectError::Stopped { .. }));
        assert_ne!(manager.phase(), Phase::Ready);
        release.notify_one();
    }

    #[tokio::test]
    async fn test_wait_ready_reports_object_failing_during_init() {
        let bus = EventBus::new();
        let broken = ObjectHandle::new(Broken, &bus);
        let manager = AoManager::new(vec![broken.clone()], &bus);
        manager.start_initialization().await.unwrap();

        let err = tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
            .await
            .expect("wait_ready returns")
            .unwrap_err();
        assert_eq!(err.as_label(), "object_handler");
        assert!(matches!(broken.lifecycle(), Lifecycle::Failed(_)));
        assert_eq!(manager.phase(), Phase::CollectingInit);
    }
}
