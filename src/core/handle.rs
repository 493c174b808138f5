//! # Object runtime: mailbox, forwarder, consumer and drain watcher.
//!
//! [`ObjectHandle`] wraps an [`ActiveObject`] behaviour and owns everything the
//! object runs in the background.
//!
//! ## Architecture
//! ```text
//!                broadcast
//! EventBus ─────────────────► forwarder ──(filter ∪ reserved)──► mailbox (unbounded FIFO)
//!                                 │                                   │
//!                                 └─ Lagged(n) → handle_error         ▼
//!                                                                  consumer
//!                                                  ┌──────────────────┼───────────────────┐
//!                                                  ▼                  ▼                   ▼
//!                                       InitializationComplete   DisposeObjects        other
//!                                            on_created()         dispose()          on_event()
//!
//! dispose(): close mailbox ─► watcher polls until drained ─► on_destroy() ─► cancel TaskGroup
//! ```
//!
//! ## Rules
//! - All hooks run under one async mutex: never concurrently, always in mailbox order.
//! - `subscribe` succeeds once; later calls fail and change nothing.
//! - Events admitted after dispose are dropped silently; queued ones still run.
//! - A fatal error (returned by `handle_error`) is logged, retained and
//!   cancels the object's own group. Peers and the bus are unaffected.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use super::filter::EventFilter;
use super::group::TaskGroup;
use super::object::ActiveObject;
use crate::bus::{panic_message, EventBus};
use crate::error::{BusError, MachineError, ObjectError};
use crate::events::{
    is_reserved, DisposeObjects, EventRef, InitPhaseTwoDone, InitializationComplete, ObjectTag,
    SubscriptionComplete,
};

/// Lifecycle of an active object, observable through [`ObjectHandle::watch_lifecycle`].
#[derive(Clone, Debug)]
pub enum Lifecycle {
    /// Wrapped, not yet subscribed.
    Created,
    /// Forwarding from the bus is active.
    Subscribed,
    /// Initial events are being published.
    Initializing,
    /// The mailbox consumer runs.
    Running,
    /// Dispose requested; the mailbox is draining.
    Draining,
    /// `on_destroy` ran and the task group is cancelled.
    Disposed,
    /// Stopped by a fatal error.
    Failed(Arc<ObjectError>),
}

impl Lifecycle {
    /// Returns `true` for [`Lifecycle::Disposed`] and [`Lifecycle::Failed`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Disposed | Lifecycle::Failed(_))
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Lifecycle::Created => "created",
            Lifecycle::Subscribed => "subscribed",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Running => "running",
            Lifecycle::Draining => "draining",
            Lifecycle::Disposed => "disposed",
            Lifecycle::Failed(_) => "failed",
        }
    }
}

/// Type-erased lifecycle entry points of an object.
#[async_trait]
trait Lifecycled: Send + Sync {
    fn name(&self) -> &str;
    fn tag(&self) -> &ObjectTag;
    async fn subscribe(self: Arc<Self>) -> Result<(), ObjectError>;
    fn do_internal_initialization(self: Arc<Self>);
    fn start_event_processing(self: Arc<Self>);
    fn lifecycle(&self) -> &watch::Sender<Lifecycle>;
    fn group(&self) -> &TaskGroup;
}

struct Core<A: ActiveObject> {
    name: String,
    tag: ObjectTag,
    filter: EventFilter,
    behavior: Arc<AsyncMutex<A>>,
    bus: EventBus,
    mailbox_tx: Mutex<Option<mpsc::UnboundedSender<EventRef>>>,
    mailbox_rx: Mutex<Option<mpsc::UnboundedReceiver<EventRef>>>,
    subscribed: AtomicBool,
    drained: AtomicBool,
    announce: bool,
    poll: Duration,
    group: TaskGroup,
    lifecycle: watch::Sender<Lifecycle>,
}

/// Maps a hook error to the most specific [`ObjectError`].
fn classify(err: anyhow::Error) -> ObjectError {
    match err.downcast::<MachineError>() {
        Ok(e) => ObjectError::Machine(e),
        Err(err) => match err.downcast::<BusError>() {
            Ok(e) => ObjectError::Bus(e),
            Err(err) => ObjectError::Handler(err),
        },
    }
}

/// Runs a hook future, turning errors and panics into [`ObjectError`].
async fn guarded<F>(fut: F) -> Result<(), ObjectError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(classify(e)),
        Err(panic) => Err(ObjectError::Panicked(panic_message(panic.as_ref()))),
    }
}

impl<A: ActiveObject> Core<A> {
    fn new(
        behavior: Arc<AsyncMutex<A>>,
        name: String,
        tag: ObjectTag,
        filter: EventFilter,
        bus: &EventBus,
        announce: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = watch::channel(Lifecycle::Created);
        Self {
            name,
            tag,
            filter,
            behavior,
            bus: bus.clone(),
            mailbox_tx: Mutex::new(Some(tx)),
            mailbox_rx: Mutex::new(Some(rx)),
            subscribed: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            announce,
            poll: bus.config().dispose_poll(),
            group: TaskGroup::new(),
            lifecycle,
        }
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        self.lifecycle.send_if_modified(|cur| {
            if cur.is_terminal() {
                return false;
            }
            debug!(object = %self.name, from = cur.as_label(), to = next.as_label(), "lifecycle");
            *cur = next;
            true
        });
    }

    /// Offers `err` to `handle_error`; returns `false` if it was fatal.
    ///
    /// The caller must hold the behaviour lock.
    async fn recover(&self, behavior: &mut A, err: ObjectError) -> bool {
        warn!(object = %self.name, kind = err.as_label(), error = %err, "object error");
        let handled = std::panic::AssertUnwindSafe(behavior.handle_error(err))
            .catch_unwind()
            .await;
        match handled {
            Ok(Ok(())) => true,
            Ok(Err(fatal)) => {
                self.fail(fatal);
                false
            }
            Err(panic) => {
                self.fail(ObjectError::Panicked(panic_message(panic.as_ref())));
                false
            }
        }
    }

    /// Same as [`recover`](Self::recover), acquiring the behaviour lock.
    async fn recover_locked(&self, err: ObjectError) -> bool {
        let mut behavior = self.behavior.lock().await;
        self.recover(&mut behavior, err).await
    }

    fn fail(&self, err: ObjectError) {
        error!(object = %self.name, kind = err.as_label(), error = %err, "object stopped by fatal error");
        self.mailbox_tx.lock().take();
        self.set_lifecycle(Lifecycle::Failed(Arc::new(err)));
        self.group.cancel();
    }

    fn admits(&self, event: &EventRef) -> bool {
        self.filter.allows(event.as_ref()) || is_reserved(event.event_type())
    }

    async fn forward(self: Arc<Self>, mut rx: broadcast::Receiver<EventRef>) {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if !self.admits(&ev) {
                        continue;
                    }
                    // Closed mailbox: drop silently.
                    if let Some(tx) = self.mailbox_tx.lock().as_ref() {
                        let _ = tx.send(ev);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    if !self.recover_locked(ObjectError::Lagged(n)).await {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn consume(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<EventRef>) {
        while let Some(ev) = rx.recv().await {
            if !self.dispatch(ev).await {
                return;
            }
        }
        self.drained.store(true, Ordering::Release);
        debug!(object = %self.name, "mailbox drained");
    }

    /// Dispatches one mailbox item; returns `false` once the object stopped.
    async fn dispatch(self: &Arc<Self>, ev: EventRef) -> bool {
        if ev.is::<DisposeObjects>() {
            self.dispose();
            return true;
        }

        let mut behavior = self.behavior.lock().await;
        let res = if ev.is::<InitializationComplete>() {
            guarded(behavior.on_created(&self.bus)).await
        } else {
            guarded(behavior.on_event(ev, &self.bus)).await
        };
        match res {
            Ok(()) => true,
            Err(err) => self.recover(&mut behavior, err).await,
        }
    }

    fn dispose(self: &Arc<Self>) {
        if self.mailbox_tx.lock().take().is_none() {
            return;
        }
        info!(object = %self.name, "disposing");
        self.set_lifecycle(Lifecycle::Draining);

        let me = Arc::clone(self);
        self.group.spawn(async move {
            let mut tick = tokio::time::interval(me.poll);
            while !me.drained.load(Ordering::Acquire) {
                tick.tick().await;
            }

            let mut behavior = me.behavior.lock().await;
            if let Err(err) = guarded(behavior.on_destroy()).await {
                if !me.recover(&mut behavior, err).await {
                    return;
                }
            }
            drop(behavior);

            me.set_lifecycle(Lifecycle::Disposed);
            info!(object = %me.name, "disposed");
            me.group.cancel();
        });
    }
}

#[async_trait]
impl<A: ActiveObject> Lifecycled for Core<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> &ObjectTag {
        &self.tag
    }

    async fn subscribe(self: Arc<Self>) -> Result<(), ObjectError> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Err(ObjectError::AlreadySubscribed {
                object: self.name.clone(),
            });
        }

        let rx = self.bus.receiver();
        self.group.spawn(Arc::clone(&self).forward(rx));
        self.set_lifecycle(Lifecycle::Subscribed);
        debug!(object = %self.name, "subscribed");

        if self.announce {
            self.bus
                .publish(SubscriptionComplete {
                    object: self.tag.clone(),
                })
                .await?;
        }
        Ok(())
    }

    fn do_internal_initialization(self: Arc<Self>) {
        self.set_lifecycle(Lifecycle::Initializing);
        let me = Arc::clone(&self);
        self.group.spawn(async move {
            {
                let mut behavior = me.behavior.lock().await;
                if let Err(err) = guarded(behavior.publish_initial_events(&me.bus)).await {
                    if !me.recover(&mut behavior, err).await {
                        return;
                    }
                }
            }
            let done = InitPhaseTwoDone {
                object: me.tag.clone(),
            };
            if let Err(err) = me.bus.publish(done).await {
                me.recover_locked(err.into()).await;
            }
        });
    }

    fn start_event_processing(self: Arc<Self>) {
        let Some(rx) = self.mailbox_rx.lock().take() else {
            warn!(object = %self.name, "event processing already started");
            return;
        };
        self.set_lifecycle(Lifecycle::Running);
        self.group.spawn(Arc::clone(&self).consume(rx));
    }

    fn lifecycle(&self) -> &watch::Sender<Lifecycle> {
        &self.lifecycle
    }

    fn group(&self) -> &TaskGroup {
        &self.group
    }
}

/// Runtime handle of an active object.
///
/// Cheap to clone. The object is bound to the bus given at construction.
/// Lifecycle entry points are normally driven by an [`AoManager`](crate::AoManager).
#[derive(Clone)]
pub struct ObjectHandle {
    core: Arc<dyn Lifecycled>,
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("name", &self.core.name())
            .field("lifecycle", &self.lifecycle().as_label())
            .finish()
    }
}

impl ObjectHandle {
    /// Wraps `behavior` into a runtime bound to `bus`.
    pub fn new<A: ActiveObject>(behavior: A, bus: &EventBus) -> Self {
        Self::wrap(behavior, bus, true).0
    }

    /// Wraps `behavior` and also returns the shared behaviour, for owners that
    /// need to run code on the object's serialized context.
    ///
    /// With `announce = false` the object never publishes `SubscriptionComplete`.
    pub(crate) fn wrap<A: ActiveObject>(
        behavior: A,
        bus: &EventBus,
        announce: bool,
    ) -> (Self, Arc<AsyncMutex<A>>) {
        let name = behavior.name();
        let tag = behavior.tag();
        let filter = behavior.filter();
        let behavior = Arc::new(AsyncMutex::new(behavior));
        let core = Core::new(Arc::clone(&behavior), name, tag, filter, bus, announce);
        (
            Self {
                core: Arc::new(core),
            },
            behavior,
        )
    }

    /// Name of the object.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Barrier identity of the object.
    pub fn tag(&self) -> &ObjectTag {
        self.core.tag()
    }

    /// Connects the object to its bus and announces it with `SubscriptionComplete`.
    ///
    /// Fails with [`ObjectError::AlreadySubscribed`] on a second call.
    pub async fn subscribe(&self) -> Result<(), ObjectError> {
        Arc::clone(&self.core).subscribe().await
    }

    /// Publishes the object's initial events, then `InitPhaseTwoDone`, in the background.
    pub fn do_internal_initialization(&self) {
        Arc::clone(&self.core).do_internal_initialization();
    }

    /// Starts the mailbox consumer. Later calls are ignored.
    pub fn start_event_processing(&self) {
        Arc::clone(&self.core).start_event_processing();
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.core.lifecycle().borrow().clone()
    }

    /// Receiver following lifecycle changes.
    pub fn watch_lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.core.lifecycle().subscribe()
    }

    /// Waits until the object is disposed or failed, and all its tasks returned.
    ///
    /// Returns the fatal error if the object failed.
    pub async fn wait_disposed(&self) -> Result<(), Arc<ObjectError>> {
        let mut rx = self.watch_lifecycle();
        let last = match rx.wait_for(Lifecycle::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => Lifecycle::Disposed,
        };
        self.core.group().wait().await;
        match last {
            Lifecycle::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}
