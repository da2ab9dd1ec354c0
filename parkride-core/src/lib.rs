//! Core types, pollers, and entity adapters for park-and-ride availability sensors.

/// Persisted config entry and its store.
pub mod config;
/// Interval pollers caching API results.
pub mod coordinator;
/// Entity adapters reflecting coordinator data.
pub mod entity;
/// Interactive setup and re-authentication flow.
pub mod flow;
/// Domain models and identifiers.
pub mod model;
/// Entity platforms and the per-entry entity registry.
pub mod platform;
/// Traits describing the park-and-ride API.
pub mod ports;
/// Runtime wiring of one configured entry.
pub mod service;

#[cfg(test)]
mod testing;

pub use config::*;
pub use coordinator::*;
pub use entity::*;
pub use flow::*;
pub use model::*;
pub use platform::*;
pub use ports::*;
pub use service::*;
