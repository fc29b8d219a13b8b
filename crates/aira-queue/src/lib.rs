//! Implementation of the application event bus using tokio channels
//! This crate implements the EventBus trait from aira-core using tokio's
//! broadcast channel.

pub mod bus;
pub mod plugin;

pub use bus::*;
pub use plugin::EventBusPlugin;

// Re-export core traits for convenience
pub use aira_core::{AppEvent, EventBus, EventReceiver, QueueError};
