//! Webhook event listener that subscribes to domain events on the event bus.

use crate::events::{NewWebhookEvent, WebhookEventType};
use crate::service::{WebhookError, WebhookService};
use aira_core::{AppEvent, EventBus, QueueError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Bridges the in-process event bus onto webhook deliveries.
///
/// Every bus event becomes one persisted webhook event; fan-out to endpoints
/// happens inside [`WebhookService::trigger_event`].
pub struct WebhookEventListener {
    webhook_service: Arc<WebhookService>,
    event_bus: Arc<dyn EventBus>,
    running: Arc<RwLock<bool>>,
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WebhookEventListener {
    pub fn new(webhook_service: Arc<WebhookService>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            webhook_service,
            event_bus,
            running: Arc::new(RwLock::new(false)),
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start listening to domain events from the bus
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut running = self.running.write().await;
        if *running {
            info!("✅ Webhook event listener already running");
            return Ok(()); // Already running
        }
        *running = true;
        drop(running);

        info!("🚀 Starting webhook event listener");

        let mut receiver = self.event_bus.subscribe();
        let webhook_service = self.webhook_service.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            info!("✅ Webhook listener task started and listening for events");
            let mut event_count = 0;
            while *running.read().await {
                match receiver.recv().await {
                    Ok(event) => {
                        event_count += 1;
                        debug!("📨 Received event #{} from bus: {}", event_count, event);
                        if let Err(e) = Self::process_event(&webhook_service, event).await {
                            error!("❌ Failed to process event #{}: {}", event_count, e);
                        }
                    }
                    Err(QueueError::ChannelClosed) => {
                        error!("⚠️ Event bus closed, stopping webhook listener");
                        break;
                    }
                    Err(e) => {
                        // Lagged receivers skip the dropped events and catch up
                        error!("⚠️ Failed to receive event from bus: {}", e);
                        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    }
                }
            }

            *running.write().await = false;
            info!(
                "🛑 Webhook event listener task stopped after processing {} events",
                event_count
            );
        });

        *self.task_handle.write().await = Some(handle);

        info!("✅ Webhook event listener started successfully");
        Ok(())
    }

    /// Stop the event listener
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        drop(running);

        if let Some(handle) = self.task_handle.write().await.take() {
            // The task may be parked in recv() with no further event coming;
            // abort instead of waiting for one
            handle.abort();
            let _ = handle.await;
        }

        info!("Stopped webhook event listener");
    }

    /// Check if the listener is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Convert one bus event into a webhook event and trigger deliveries.
    ///
    /// The payload is the serialized per-event struct; the wrapper enum never
    /// reaches receivers. Bus events carry no HTTP context, so each gets a
    /// fresh request id.
    async fn process_event(
        webhook_service: &WebhookService,
        event: AppEvent,
    ) -> Result<(), WebhookError> {
        let (event_type, data) = match &event {
            AppEvent::SurveyCreated(payload) => (
                WebhookEventType::SurveyCreated,
                serde_json::to_string(payload)?,
            ),
            AppEvent::SurveyUpdated(payload) => (
                WebhookEventType::SurveyUpdated,
                serde_json::to_string(payload)?,
            ),
            AppEvent::SurveyDeleted(payload) => (
                WebhookEventType::SurveyDeleted,
                serde_json::to_string(payload)?,
            ),
            AppEvent::ResponseSubmitted(payload) => (
                WebhookEventType::ResponseSubmitted,
                serde_json::to_string(payload)?,
            ),
            AppEvent::AssessmentCompleted(payload) => (
                WebhookEventType::AssessmentCompleted,
                serde_json::to_string(payload)?,
            ),
            AppEvent::ReportGenerated(payload) => (
                WebhookEventType::ReportGenerated,
                serde_json::to_string(payload)?,
            ),
        };

        let new_event = NewWebhookEvent {
            event_type,
            data,
            organization_id: event.organization_id(),
            user_id: event.user_id(),
            request_id: uuid::Uuid::new_v4().to_string(),
        };

        let persisted = webhook_service.trigger_event(new_event).await?;
        debug!("📤 Webhook event {} recorded for {}", persisted.id, event);

        Ok(())
    }
}
