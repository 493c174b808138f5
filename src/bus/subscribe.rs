//! # Subscriber trait for non-object consumers.
//!
//! `Subscribe` plugs arbitrary observers (loggers, UI bridges, metrics) into the
//! bus without making them active objects. Each attached subscriber is driven by
//! a dedicated worker fed by a bounded queue (see [`Subscription`](crate::Subscription)).
//!
//! ## Contract
//! - Implementations may be slow; they never block the publisher, other
//!   subscribers or active objects.
//! - On queue overflow, events for that subscriber are **dropped** (warn).
//! - Subscribers only observe; they take no part in the startup barrier.
//!
//! ## Example (skeleton)
//! ```rust
//! // use actorbus::{Event, Subscribe};
//! //
//! // struct Audit;
//! // #[async_trait::async_trait]
//! // impl Subscribe for Audit {
//! //     async fn on_event(&self, ev: &dyn Event) {
//! //         // write audit record...
//! //     }
//! //     fn name(&self) -> &'static str { "audit" }
//! // }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for bus subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &dyn Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity; `None` uses `RuntimeConfig::subscriber_queue`.
    fn queue_capacity(&self) -> Option<usize> {
        None
    }
}
