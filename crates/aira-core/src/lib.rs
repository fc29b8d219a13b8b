//! Core utilities and types shared across all Aira crates

pub mod config;
pub mod error;
pub mod error_builder;
pub mod events;
pub mod plugin;
pub mod problemdetails;
pub use problemdetails::ProblemDetails;
pub mod types;
pub mod utils;
mod request_metadata;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use error_builder::*;
pub use events::*;
pub use utils::*;

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use uuid;
pub use request_metadata::RequestMetadata;
pub use types::*;

// Re-export standard datetime type for use across all crates
pub use types::UtcDateTime;
