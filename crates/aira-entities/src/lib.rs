pub mod organizations;
pub mod users;
pub mod api_keys;

// Webhook entities
pub mod webhook_endpoints;
pub mod webhook_events;
pub mod webhook_delivery_attempts;

pub mod prelude;
