//! # Demo: startup
//!
//! A thermostat driven by a hierarchical state machine, fed by two sensor objects.
//!
//! Demonstrates how to:
//! - Build an [`EventBus`] with in-memory persistence and registered defaults.
//! - Publish sticky and sticky-collection events from `publish_initial_events`.
//! - Start several objects through the [`AoManager`] barrier.
//! - Bubble unhandled events from a child state to its parent.
//! - Dispose every object with [`DisposeObjects`].
//!
//! ## Flow
//! ```text
//! AoManager::start_initialization()
//!     ├─► sensors + thermostat subscribe
//!     ├─► sensors publish Reading{sensor} (collection); Setpoint falls back to its default
//!     ├─► Ready: InitializationComplete ─► thermostat enters `idle`
//!     ├─► Reading below setpoint ─► idle → heating
//!     ├─► Reading above setpoint ─► heating → idle
//!     └─► DisposeObjects ─► drain, on_destroy, exit
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example startup
//! ```

use std::sync::Arc;
use std::time::Duration;

use actorbus::{
    ActiveObject, AoManager, Context, DefaultRegistry, DisposeObjects, Event, EventBus,
    EventFilter, EventKey, EventRef, HsmObject, InMemoryRegistry, KeyRule, NormalState,
    ObjectHandle, ObjectTag, Outcome, State, StateMachine, Stickiness,
};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    sensor: i64,
    celsius: i32,
}

impl Event for Reading {
    fn stickiness(&self) -> Stickiness {
        Stickiness::Collection
    }
    fn key(&self) -> Option<EventKey> {
        Some(self.sensor.into())
    }
    fn key_rule(&self) -> Option<KeyRule> {
        Some(KeyRule::ItemsRange { min: 1, max: 4 })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Setpoint(i32);

impl Default for Setpoint {
    fn default() -> Self {
        Setpoint(20)
    }
}

impl Event for Setpoint {
    fn stickiness(&self) -> Stickiness {
        Stickiness::Sticky
    }
    fn is_persistable(&self) -> bool {
        true
    }
}

/// One temperature sensor.
struct Sensor {
    id: i64,
    start: i32,
}

#[async_trait]
impl ActiveObject for Sensor {
    fn tag(&self) -> ObjectTag {
        ObjectTag::labelled::<Self>(format!("sensor-{}", self.id))
    }

    fn filter(&self) -> EventFilter {
        EventFilter::new()
    }

    async fn publish_initial_events(&mut self, bus: &EventBus) -> anyhow::Result<()> {
        bus.publish(Reading {
            sensor: self.id,
            celsius: self.start,
        })
        .await?;
        Ok(())
    }

    async fn on_event(&mut self, _event: EventRef, _bus: &EventBus) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_destroy(&mut self) -> anyhow::Result<()> {
        println!("[sensor-{}] destroyed", self.id);
        Ok(())
    }
}

/// Parent of both thermostat states: logs readings nobody handled.
struct Operating;

#[async_trait]
impl NormalState<()> for Operating {
    fn name(&self) -> &str {
        "operating"
    }

    async fn process_event(&self, ev: &EventRef, ctx: &Context<()>) -> anyhow::Result<Outcome<()>> {
        if let Some(r) = ev.downcast_ref::<Reading>() {
            println!(
                "[thermostat] {}: sensor {} at {}°C, nothing to do",
                ctx.current_state().name(),
                r.sensor,
                r.celsius
            );
        }
        Ok(Outcome::Handled)
    }
}

/// `idle` or `heating`, depending on `heats`.
struct Mode {
    name: &'static str,
    heats: bool,
    parent: State<()>,
    other: std::sync::OnceLock<State<()>>,
}

#[async_trait]
impl NormalState<()> for Mode {
    fn name(&self) -> &str {
        self.name
    }

    fn parent(&self) -> Option<State<()>> {
        Some(self.parent.clone())
    }

    async fn on_enter(
        &self,
        _ctx: &Context<()>,
        _params: Option<&actorbus::TransitionParams>,
    ) -> anyhow::Result<()> {
        println!("[thermostat] -> {}", self.name);
        Ok(())
    }

    async fn process_event(&self, ev: &EventRef, ctx: &Context<()>) -> anyhow::Result<Outcome<()>> {
        let Some(r) = ev.downcast_ref::<Reading>() else {
            return Ok(Outcome::Unhandled);
        };
        let Setpoint(target) = ctx.bus().get_sticky::<Setpoint>().await?;
        let cold = r.celsius < target;
        match self.other.get() {
            Some(other) if cold != self.heats => Ok(Outcome::transition(other.clone())),
            _ => Ok(Outcome::Unhandled),
        }
    }
}

fn thermostat(bus: &EventBus) -> HsmObject<()> {
    let operating = State::normal(Operating);
    let idle = Arc::new(Mode {
        name: "idle",
        heats: false,
        parent: operating.clone(),
        other: Default::default(),
    });
    let heating = Arc::new(Mode {
        name: "heating",
        heats: true,
        parent: operating,
        other: Default::default(),
    });
    let _ = idle.other.set(State::Normal(heating.clone()));
    let _ = heating.other.set(State::Normal(idle.clone()));

    let machine = StateMachine::new("thermostat", State::Normal(idle), (), bus);
    HsmObject::new(machine, EventFilter::new().with::<Reading>())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let persistence = Arc::new(InMemoryRegistry::new());
    let bus = EventBus::builder()
        .persistence(persistence.clone())
        .defaults(Arc::new(DefaultRegistry::new().register::<Setpoint>()))
        .build();

    #[cfg(feature = "logging")]
    let _log = bus.attach(Arc::new(actorbus::LogWriter::default()));

    let objects = vec![
        ObjectHandle::new(Sensor { id: 1, start: 19 }, &bus),
        ObjectHandle::new(Sensor { id: 2, start: 22 }, &bus),
        ObjectHandle::new(thermostat(&bus), &bus),
    ];

    let manager = AoManager::new(objects.clone(), &bus);
    manager.start_initialization().await?;
    manager.wait_ready().await?;

    let readings = bus.get_collection::<Reading>().await?;
    println!("[main] latched readings: {readings:?}");
    println!("[main] setpoint: {:?}", bus.get_sticky::<Setpoint>().await?);

    bus.publish(Setpoint(21)).await?;
    bus.publish(Reading { sensor: 1, celsius: 17 }).await?;
    bus.publish(Reading { sensor: 2, celsius: 23 }).await?;
    bus.publish(Reading { sensor: 2, celsius: 24 }).await?;

    if let Err(err) = bus.publish(Reading { sensor: 9, celsius: 0 }).await {
        println!("[main] rejected: {err}");
    }
    println!("[main] persisted events: {}", persistence.len());

    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.publish(DisposeObjects).await?;
    for object in &objects {
        if let Err(err) = object.wait_disposed().await {
            println!("[main] {} failed: {err}", object.name());
        }
    }
    println!("[main] done");
    Ok(())
}
