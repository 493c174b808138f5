//! Active object delegating its events to a [`StateMachine`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::machine::StateMachine;
use crate::bus::EventBus;
use crate::core::{ActiveObject, EventFilter};
use crate::events::{EventRef, ObjectTag};

type InitialEvents = Arc<dyn Fn(EventBus) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Active object whose behaviour is a state machine.
///
/// The machine is initialized by `on_created`, or by the first admitted event
/// if that arrives earlier. Every admitted event goes to
/// [`StateMachine::process_event`]. Machine errors reach `handle_error` as
/// [`ObjectError::Machine`](crate::ObjectError::Machine).
///
/// The tag is labelled with the object name, so several `HsmObject`s over the
/// same services type can share one [`AoManager`](crate::AoManager) as long
/// as their names differ.
pub struct HsmObject<S: Send + Sync + 'static> {
    name: String,
    filter: EventFilter,
    machine: StateMachine<S>,
    initial_events: Option<InitialEvents>,
}

impl<S: Send + Sync + 'static> HsmObject<S> {
    /// Wraps `machine`; the object is named after the machine.
    pub fn new(machine: StateMachine<S>, filter: EventFilter) -> Self {
        Self {
            name: machine.name().to_owned(),
            filter,
            machine,
            initial_events: None,
        }
    }

    /// Sets the closure run by `publish_initial_events`.
    #[must_use]
    pub fn with_initial_events<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(EventBus) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.initial_events = Some(Arc::new(move |bus| Box::pin(f(bus))));
        self
    }

    /// The wrapped machine.
    pub fn machine(&self) -> &StateMachine<S> {
        &self.machine
    }
}

#[async_trait]
impl<S: Send + Sync + 'static> ActiveObject for HsmObject<S> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn tag(&self) -> ObjectTag {
        ObjectTag::labelled::<Self>(self.name.clone())
    }

    fn filter(&self) -> EventFilter {
        self.filter.clone()
    }

    async fn publish_initial_events(&mut self, bus: &EventBus) -> anyhow::Result<()> {
        match &self.initial_events {
            Some(f) => f(bus.clone()).await,
            None => Ok(()),
        }
    }

    async fn on_created(&mut self, _bus: &EventBus) -> anyhow::Result<()> {
        if !self.machine.is_initialized() {
            self.machine.initialize().await?;
        }
        Ok(())
    }

    async fn on_event(&mut self, event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
        // Events queued during startup run before InitializationComplete.
        if !self.machine.is_initialized() {
            self.machine.initialize().await?;
        }
        self.machine.process_event(&event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::{AoManager, ObjectHandle};
    use crate::events::Event;
    use crate::hsm::{Context, NormalState, Outcome, State};

    #[derive(Debug, Clone, PartialEq)]
    struct Knock;
    impl Event for Knock {}

    #[derive(Debug, Clone, PartialEq)]
    struct Opened;
    impl Event for Opened {}

    struct Closed;

    #[async_trait]
    impl NormalState<()> for Closed {
        fn name(&self) -> &str {
            "closed"
        }

        async fn process_event(&self, ev: &EventRef, ctx: &Context<()>) -> anyhow::Result<Outcome<()>> {
            if ev.is::<Knock>() {
                ctx.bus().publish(Opened).await?;
            }
            Ok(Outcome::Handled)
        }
    }

    #[tokio::test]
    async fn test_machine_runs_behind_the_barrier() {
        let bus = EventBus::new();
        let mut opened = bus.receiver();
        let machine = StateMachine::new("door", State::normal(Closed), (), &bus);
        let door = ObjectHandle::new(
            HsmObject::new(machine, EventFilter::new().with::<Knock>()),
            &bus,
        );
        assert!(door.tag().name().contains("door"));

        let manager = AoManager::new(vec![door], &bus);
        manager.start_initialization().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), manager.wait_ready())
            .await
            .expect("ready")
            .unwrap();

        bus.publish(Knock).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let ev = opened.recv().await.unwrap();
                if ev.is::<Opened>() {
                    return ev;
                }
            }
        })
        .await
        .expect("door opened");
        assert!(seen.is::<Opened>());
    }
}
