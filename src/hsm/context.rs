//! Context handed to every state hook.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use super::state::State;
use crate::bus::EventBus;

/// Read access to the machine's services, bus and current state.
pub struct Context<S> {
    machine: Arc<str>,
    services: Arc<S>,
    bus: EventBus,
    current: watch::Receiver<State<S>>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            machine: Arc::clone(&self.machine),
            services: Arc::clone(&self.services),
            bus: self.bus.clone(),
            current: self.current.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Context<S> {
    pub(crate) fn new(
        machine: Arc<str>,
        services: Arc<S>,
        bus: EventBus,
        current: watch::Receiver<State<S>>,
    ) -> Self {
        Self {
            machine,
            services,
            bus,
            current,
        }
    }

    /// Services shared by all states of the machine.
    pub fn services(&self) -> &S {
        &self.services
    }

    /// Shared handle to the services.
    pub fn services_arc(&self) -> Arc<S> {
        Arc::clone(&self.services)
    }

    /// Bus the machine is bound to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Name of the owning machine.
    pub fn machine_name(&self) -> &str {
        &self.machine
    }

    /// State the machine is in right now.
    ///
    /// During `on_enter` this is already the entered state.
    pub fn current_state(&self) -> State<S> {
        self.current.borrow().clone()
    }
}

impl<S: Send + Sync + 'static> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("machine", &self.machine)
            .field("current", &self.current.borrow().name())
            .finish()
    }
}
