//! # The `ActiveObject` behaviour trait.
//!
//! An active object is user code wrapped by the runtime into an
//! [`ObjectHandle`](crate::ObjectHandle). The runtime guarantees that all hooks of
//! one object run one at a time, in mailbox order, and never concurrently.
//!
//! ## Hook order
//! ```text
//! subscribe()                   ──► (forwarding starts) ──► SubscriptionComplete
//! do_internal_initialization()  ──► publish_initial_events() ──► InitPhaseTwoDone
//! start_event_processing()      ──► mailbox loop:
//!                                     InitializationComplete → on_created()
//!                                     DisposeObjects         → drain → on_destroy()
//!                                     anything else          → on_event()
//! any hook error / panic        ──► handle_error()  (default: re-raise = fatal)
//! forwarder lag                 ──► handle_error()  (default: keep running)
//! ```
//!
//! ## Example
//! ```rust
//! use actorbus::{ActiveObject, EventBus, EventFilter, EventRef};
//! use async_trait::async_trait;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Tick(u64);
//! impl actorbus::Event for Tick {}
//!
//! struct Counter { ticks: u64 }
//!
//! #[async_trait]
//! impl ActiveObject for Counter {
//!     fn filter(&self) -> EventFilter {
//!         EventFilter::new().with::<Tick>()
//!     }
//!
//!     async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
//!         self.ticks += 1;
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use tracing::warn;

use super::filter::EventFilter;
use crate::bus::EventBus;
use crate::error::ObjectError;
use crate::events::{EventRef, ObjectTag};

/// Behaviour of an active object.
#[async_trait]
pub trait ActiveObject: Send + 'static {
    /// Name used in logs and errors. Defaults to the tag name.
    fn name(&self) -> String {
        self.tag().name().to_owned()
    }

    /// Identity inside the startup barrier. Defaults to the concrete type.
    ///
    /// Objects sharing a tag cannot be told apart by the orchestrator; give
    /// each instance of a shared type its own [`ObjectTag::labelled`] tag.
    fn tag(&self) -> ObjectTag {
        ObjectTag::of::<Self>()
    }

    /// Events this object wants in its mailbox.
    fn filter(&self) -> EventFilter;

    /// Publishes the object's initial (usually sticky) events.
    ///
    /// Runs once, after every registered object has subscribed.
    async fn publish_initial_events(&mut self, _bus: &EventBus) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handles one admitted event.
    async fn on_event(&mut self, event: EventRef, bus: &EventBus) -> anyhow::Result<()>;

    /// Called when the orchestrator announces that every object is running.
    async fn on_created(&mut self, _bus: &EventBus) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the mailbox drained on dispose.
    ///
    /// The task group is cancelled right after this returns; work spawned here
    /// does not outlive the object.
    async fn on_destroy(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Decides what to do with a failure.
    ///
    /// Returning `Ok` swallows the error and the object keeps running.
    /// Returning `Err` is fatal: the error is logged, retained and the
    /// object's task group is cancelled.
    ///
    /// The default keeps the object running after [`ObjectError::Lagged`]
    /// (the skipped events are lost, later ones still arrive) and treats
    /// every other error as fatal.
    async fn handle_error(&mut self, error: ObjectError) -> Result<(), ObjectError> {
        match error {
            ObjectError::Lagged(skipped) => {
                warn!(object = %self.name(), skipped, "mailbox forwarder lagged, continuing");
                Ok(())
            }
            other => Err(other),
        }
    }
}
