pub use super::api_keys::Entity as ApiKeys;
pub use super::organizations::Entity as Organizations;
pub use super::users::Entity as Users;
pub use super::webhook_delivery_attempts::Entity as WebhookDeliveryAttempts;
pub use super::webhook_endpoints::Entity as WebhookEndpoints;
pub use super::webhook_events::Entity as WebhookEvents;
