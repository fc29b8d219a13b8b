//! # aira-webhooks
//!
//! Webhook delivery subsystem for Aira:
//!
//! - **Endpoint registry**: organization-scoped CRUD for webhook endpoints
//! - **Event triggering**: persists every event, then fans out to subscribed
//!   endpoints in detached tasks
//! - **Delivery**: signed HTTP POSTs with per-endpoint timeouts, linear retry
//!   backoff and a full delivery audit trail
//! - **Signatures**: HMAC-SHA256 over the exact request body, verifiable by
//!   receivers via `X-Signature-SHA256`
//! - **Event listener**: bridges the in-process event bus onto webhook
//!   deliveries
//! - **HTTP API**: management routes under `/api/webhooks` plus
//!   `POST /api/events` for explicit event publication

mod delivery;
mod events;
mod handlers;
mod listener;
mod plugin;
mod service;
mod signature;

pub use delivery::{AttemptOutcome, DeliveryClient, USER_AGENT};
pub use events::{DeliveryFailedPayload, NewWebhookEvent, WebhookEventType};
pub use handlers::{configure_routes, WebhookState, WebhooksApiDoc};
pub use listener::WebhookEventListener;
pub use plugin::WebhooksPlugin;
pub use service::{
    CreateWebhookRequest, TestDeliveryResult, UpdateWebhookRequest, WebhookError, WebhookService,
};
pub use signature::{sign_payload, verify_signature};
