use std::sync::Arc;

use aira_core::async_trait::async_trait;
use aira_core::{
    AppEvent, AssessmentCompletedEvent, EventBus, EventReceiver, QueueError,
    ResponseSubmittedEvent, SurveyCreatedEvent,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishError { details: String, event_type: String },

    #[error("Event channel closed")]
    ChannelClosed { event_type: String },

    #[error("Invalid event data: {details}")]
    InvalidEventData { details: String, event_type: String },
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    broadcast_sender: broadcast::Sender<AppEvent>,
}

// Wrapper for broadcast::Receiver to implement the EventReceiver trait
pub struct BroadcastEventReceiver {
    receiver: broadcast::Receiver<AppEvent>,
}

#[async_trait]
impl EventReceiver for BroadcastEventReceiver {
    async fn recv(&mut self) -> Result<AppEvent, QueueError> {
        let result = self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => {
                error!("❌ Broadcast channel closed");
                QueueError::ChannelClosed
            }
            broadcast::error::RecvError::Lagged(n) => {
                error!("⚠️ Receiver lagged by {} events", n);
                QueueError::ReceiveError(format!("Receiver lagged by {} events", n))
            }
        });

        if let Ok(event) = &result {
            debug!("📨 Received event: {}", event);
        }

        result
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn send(&self, event: AppEvent) -> Result<(), QueueError> {
        let subscriber_count = self.broadcast_sender.receiver_count();
        debug!(
            "🚀 Broadcasting event to {} subscribers: {}",
            subscriber_count, event
        );

        if subscriber_count == 0 {
            error!(
                "🚨 No subscribers listening to the event bus, event will be lost: {}",
                event
            );
        }

        self.broadcast_sender.send(event).map_err(|e| {
            error!("❌ Failed to broadcast event: {}", e);
            QueueError::SendError(format!("Broadcast send failed: {}", e))
        })?;

        Ok(())
    }

    fn subscribe(&self) -> Box<dyn EventReceiver> {
        debug!(
            "📡 Creating event bus subscriber (current count: {})",
            self.broadcast_sender.receiver_count()
        );

        Box::new(BroadcastEventReceiver {
            receiver: self.broadcast_sender.subscribe(),
        })
    }
}

impl BroadcastEventBus {
    pub fn new(broadcast_sender: broadcast::Sender<AppEvent>) -> Self {
        Self { broadcast_sender }
    }

    pub fn create_broadcast_channel(
        buffer_size: usize,
    ) -> (BroadcastEventBus, broadcast::Receiver<AppEvent>) {
        let (sender, receiver) = broadcast::channel(buffer_size);
        (BroadcastEventBus::new(sender), receiver)
    }

    /// Create a new event bus behind the EventBus trait.
    /// Returns (bus, keep_alive_receiver) - the receiver must be kept alive,
    /// otherwise the channel closes as soon as no subscriber exists.
    pub fn create_event_bus_arc_with_receiver(
        buffer_size: usize,
    ) -> (Arc<dyn EventBus>, broadcast::Receiver<AppEvent>) {
        let (sender, receiver) = broadcast::channel(buffer_size);
        (Arc::new(BroadcastEventBus::new(sender)), receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.broadcast_sender.subscribe()
    }

    pub async fn publish_survey_created(
        &self,
        data: SurveyCreatedEvent,
    ) -> Result<(), EventBusError> {
        info!("Broadcasting survey created event for survey {}", data.survey_id);
        if data.survey_name.is_empty() {
            return Err(EventBusError::InvalidEventData {
                details: "Survey name cannot be empty".to_string(),
                event_type: "survey_created".to_string(),
            });
        }
        self.broadcast_sender
            .send(AppEvent::SurveyCreated(data))
            .map_err(|e| {
                error!("Failed to broadcast survey created event: {}", e);
                EventBusError::PublishError {
                    details: e.to_string(),
                    event_type: "survey_created".to_string(),
                }
            })?;
        Ok(())
    }

    pub async fn publish_response_submitted(
        &self,
        data: ResponseSubmittedEvent,
    ) -> Result<(), EventBusError> {
        info!(
            "Broadcasting response submitted event for response {}",
            data.response_id
        );
        self.broadcast_sender
            .send(AppEvent::ResponseSubmitted(data))
            .map_err(|e| {
                error!("Failed to broadcast response submitted event: {}", e);
                EventBusError::PublishError {
                    details: e.to_string(),
                    event_type: "response_submitted".to_string(),
                }
            })?;
        Ok(())
    }

    pub async fn publish_assessment_completed(
        &self,
        data: AssessmentCompletedEvent,
    ) -> Result<(), EventBusError> {
        info!(
            "Broadcasting assessment completed event for response {}",
            data.response_id
        );
        if data.readiness_tier.is_empty() {
            return Err(EventBusError::InvalidEventData {
                details: "Readiness tier cannot be empty".to_string(),
                event_type: "assessment_completed".to_string(),
            });
        }
        self.broadcast_sender
            .send(AppEvent::AssessmentCompleted(data))
            .map_err(|e| {
                error!("Failed to broadcast assessment completed event: {}", e);
                EventBusError::PublishError {
                    details: e.to_string(),
                    event_type: "assessment_completed".to_string(),
                }
            })?;
        Ok(())
    }
}
