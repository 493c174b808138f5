//! The shared event bus and its subscribers.
//!
//! ## Contents
//! - [`EventBus`], [`EventBusBuilder`]: broadcast channel, per-type sticky shards, publish pipeline
//! - [`Subscribe`], [`Subscription`]: observers attached with their own worker and queue
//! - `LogWriter` (feature `logging`): subscriber logging every event
//!
//! ## Architecture
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//! publish(ev) ─────────► │ EventBus                                     │
//!                        │  ShardMap: type ─► Mutex<Shard>              │
//!                        │     Shard { sticky, collection[key], rule }  │
//!                        │  broadcast::Sender<EventRef>                 │
//!                        └──────┬─────────────────┬─────────────────────┘
//!                               ▼                 ▼
//!                     object forwarders     attached subscribers
//!                     (filter → mailbox)    (bounded queue → worker)
//! ```
//!
//! Durability and defaults are delegated to the collaborators in [`persist`](crate::persist).

#[allow(clippy::module_inception)]
mod bus;
#[cfg(feature = "logging")]
mod log;
mod shard;
mod subscribe;
mod subscription;

pub use bus::{EventBus, EventBusBuilder};
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscription::Subscription;

pub(crate) use subscription::panic_message;
