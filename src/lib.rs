//! # actorbus
//!
//! **Actorbus** is an in-process actor runtime built around a shared event bus.
//!
//! Independent long-lived *active objects* communicate only through the bus,
//! start up in lock-step through a barrier protocol, and may delegate their
//! event handling to a hierarchical state machine.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ActiveObject │   │ ActiveObject │   │  HsmObject   │
//!     │  (user #1)   │   │  (user #2)   │   │ (machine #3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ObjectHandle │   │ ObjectHandle │   │ ObjectHandle │   ◄── AoManager drives
//!     │ mailbox+group│   │ mailbox+group│   │ mailbox+group│       subscribe / init / start
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ forwarders (filter ∪ reserved control events)  ▲
//!            │                                                │ publish
//! ┌──────────┴────────────────────────────────────────────────┴───────┐
//! │ EventBus                                                          │
//! │  - broadcast channel (capacity: RuntimeConfig::bus_capacity)      │
//! │  - per-type shards: sticky instance, keyed collection, key rule   │
//! │  - publish: validate ─► key rule ─► latch + emit ─► persist       │
//! │  - reads:   memory ─► PersistenceRegistry ─► DefaultFactory       │
//! └──────────┬─────────────────────────────────────────────┬──────────┘
//!            ▼                                             ▼
//!   PersistenceRegistry                              attached Subscribe
//!   (durable state, injected)                        (bounded queue → worker)
//! ```
//!
//! ### Startup
//! ```text
//! AoManager::start_initialization()
//!   ├─► CollectingSubscriptions: obj.subscribe()                 ◄─ SubscriptionComplete(tag)
//!   ├─► CollectingInit:          obj.do_internal_initialization() ◄─ InitPhaseTwoDone(tag)
//!   └─► Ready:                   obj.start_event_processing(), publish InitializationComplete
//!
//! InitializationComplete ─► on_created() in every object
//! DisposeObjects         ─► every object drains its mailbox, runs on_destroy(), cancels its tasks
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Events**        | Capability-tagged events: sticky, keyed collections, validation.  | [`Event`], [`KeyRule`], [`Stickiness`]      |
//! | **Bus**           | Publish pipeline, latched state, fallback reads, deletes.         | [`EventBus`], [`Subscribe`]                 |
//! | **Persistence**   | Injected durable store and default-value factory.                 | [`PersistenceRegistry`], [`DefaultFactory`] |
//! | **Active objects**| Serialized mailbox execution with lifecycle hooks.                | [`ActiveObject`], [`ObjectHandle`]          |
//! | **Startup**       | Three-phase barrier from registered to running.                   | [`AoManager`]                               |
//! | **State machines**| Hierarchical states with parent bubbling and transient states.    | [`StateMachine`], [`State`], [`HsmObject`]  |
//! | **Errors**        | Typed errors for the bus, objects and machines.                   | [`BusError`], [`ObjectError`], [`MachineError`] |
//! | **Configuration** | Centralize runtime settings.                                      | [`RuntimeConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use actorbus::{ActiveObject, AoManager, DisposeObjects, Event, EventBus, EventFilter, EventRef, ObjectHandle, Stickiness};
//! use async_trait::async_trait;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Temperature(i32);
//! impl Event for Temperature {
//!     fn stickiness(&self) -> Stickiness { Stickiness::Sticky }
//! }
//!
//! struct Sensor;
//!
//! #[async_trait]
//! impl ActiveObject for Sensor {
//!     fn filter(&self) -> EventFilter { EventFilter::new() }
//!
//!     async fn publish_initial_events(&mut self, bus: &EventBus) -> anyhow::Result<()> {
//!         bus.publish(Temperature(21)).await?;
//!         Ok(())
//!     }
//!
//!     async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new();
//!     let sensor = ObjectHandle::new(Sensor, &bus);
//!
//!     let manager = AoManager::new(vec![sensor.clone()], &bus);
//!     manager.start_initialization().await?;
//!     manager.wait_ready().await?;
//!
//!     assert_eq!(bus.get_sticky::<Temperature>().await?, Temperature(21));
//!
//!     bus.publish(DisposeObjects).await?;
//!     sensor.wait_disposed().await.map_err(|e| e.to_string())?;
//!     Ok(())
//! }
//! ```
mod bus;
mod config;
mod core;
mod error;
mod events;
mod hsm;
pub mod persist;

// ---- Public re-exports ----

pub use bus::{EventBus, EventBusBuilder, Subscribe, Subscription};
pub use config::RuntimeConfig;
pub use core::{ActiveObject, AoManager, EventFilter, Lifecycle, ObjectHandle, Phase};
pub use error::{BusError, MachineError, NoDefaultError, ObjectError};
pub use events::{
    is_reserved, DisposeObjects, Event, EventKey, EventObject, EventRef, EventType,
    InitPhaseTwoDone, InitializationComplete, KeyRule, ObjectTag, Stickiness,
    SubscriptionComplete,
};
pub use hsm::{
    Context, HsmObject, NormalState, Outcome, State, StateMachine, TransientState,
    TransitionParams,
};
pub use persist::{
    DefaultFactory, DefaultRegistry, InMemoryRegistry, NoDefaults, NoPersistence,
    PersistenceRegistry,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use bus::LogWriter;
