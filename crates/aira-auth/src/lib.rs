mod apikey_service;
mod macros;
mod middleware;
mod permission_guard;
mod plugin;
pub mod context;
pub mod permissions;

pub use macros::*;
pub use middleware::AuthMiddleware;

pub use context::*;
pub use permissions::*;

// Export plugin
pub use plugin::AuthPlugin;

// Export services
pub use apikey_service::{ApiKeyService, ApiKeyServiceError, CreatedApiKey};
