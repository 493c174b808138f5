//! # LogWriter: bus event printer
//!
//! A minimal subscriber that logs every bus event through `tracing` at `INFO`.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! INFO actorbus::bus::log: event event_type=actorbus::events::control::SubscriptionComplete event=SubscriptionComplete { object: demo::Sensor }
//! INFO actorbus::bus::log: event event_type=demo::Temperature event=Temperature { sensor: 1, celsius: 21.5 }
//! ```

use async_trait::async_trait;
use tracing::info;

use super::subscribe::Subscribe;
use crate::events::Event;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &dyn Event) {
        info!(event_type = %e.event_type(), event = ?e, "event");
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
