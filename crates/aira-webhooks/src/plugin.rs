//! Webhooks plugin for the Aira plugin system
//!
//! This plugin provides webhook functionality including:
//! - WebhookService for managing webhook endpoints and deliveries
//! - Webhook CRUD operations
//! - Delivery tracking and retry logic
//! - Event listener bridging the internal event bus to webhook deliveries
//! - HTTP handlers and OpenAPI documentation for webhook endpoints

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aira_core::plugin::{
    middleware_helpers, AiraPlugin, MiddlewareCondition, MiddlewarePriority, PluginContext,
    PluginError, PluginMiddlewareCollection, PluginRoutes, ServiceRegistrationContext,
};
use aira_core::EventBus;
use tracing::debug;
use utoipa::openapi::OpenApi;
use utoipa::OpenApi as OpenApiTrait;

use crate::{
    delivery::DeliveryClient,
    handlers::{configure_routes, WebhookState, WebhooksApiDoc},
    listener::WebhookEventListener,
    service::WebhookService,
};

/// Webhooks plugin for managing webhook endpoints and deliveries
pub struct WebhooksPlugin;

impl WebhooksPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebhooksPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AiraPlugin for WebhooksPlugin {
    fn name(&self) -> &'static str {
        "webhooks"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            // Get required dependencies from the service registry
            let db = context.require_service::<sea_orm::DatabaseConnection>();
            let event_bus = context.require_service::<dyn EventBus>();

            let delivery_client = Arc::new(DeliveryClient::new());
            let webhook_service = Arc::new(WebhookService::new(db, delivery_client));
            context.register_service(webhook_service.clone());

            // Create WebhookState for handlers
            let webhook_state = Arc::new(WebhookState::new(webhook_service.clone()));
            context.register_service(webhook_state);

            let event_listener = Arc::new(WebhookEventListener::new(webhook_service, event_bus));

            // Register the listener service FIRST
            context.register_service(event_listener.clone());

            // Start the listener in the background (don't await)
            // This allows other plugins to initialize without waiting for the listener
            tokio::spawn({
                let event_listener = event_listener.clone();
                async move {
                    match event_listener.start().await {
                        Ok(_) => {
                            tracing::info!("🎉 Webhook event listener started successfully");
                        }
                        Err(e) => {
                            tracing::error!("❌ Failed to start webhook event listener: {}", e);
                        }
                    }
                }
            });

            debug!("Webhooks plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        // Get the webhook state
        let webhook_state = context.require_service::<WebhookState>();

        // Build webhook routes using the existing configure_routes function
        let routes = configure_routes().with_state(webhook_state);

        Some(PluginRoutes { router: routes })
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        Some(<WebhooksApiDoc as OpenApiTrait>::openapi())
    }

    fn configure_middleware(&self, _context: &PluginContext) -> Option<PluginMiddlewareCollection> {
        let mut middleware_collection = PluginMiddlewareCollection::new();

        // Mirror x-request-id onto every response; webhook events persist the
        // same id, so callers can correlate a delivery with the request that
        // caused it
        middleware_collection.add_middleware(
            "request_id",
            "webhooks",
            MiddlewarePriority::Observability,
            MiddlewareCondition::Always,
            middleware_helpers::request_id_middleware("webhooks"),
        );

        Some(middleware_collection)
    }
}
