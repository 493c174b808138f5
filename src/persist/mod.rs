//! Collaborators consulted by the bus for durable state and defaults.
//!
//! ## Contents
//! - [`PersistenceRegistry`] storage contract, with [`NoPersistence`] and [`InMemoryRegistry`]
//! - [`DefaultFactory`] default-value contract, with [`NoDefaults`] and [`DefaultRegistry`]
//!
//! Both are injected through [`EventBusBuilder`](crate::EventBusBuilder).

mod defaults;
mod registry;

pub use defaults::{DefaultFactory, DefaultRegistry, NoDefaults};
pub use registry::{InMemoryRegistry, NoPersistence, PersistenceRegistry};
