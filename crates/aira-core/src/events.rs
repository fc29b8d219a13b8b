use serde::{Deserialize, Serialize};
use std::fmt;

/// How a respondent answered: spoken or typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseChannel {
    Voice,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyCreatedEvent {
    pub survey_id: i32,
    pub survey_name: String,
    pub organization_id: i32,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyUpdatedEvent {
    pub survey_id: i32,
    pub survey_name: String,
    pub organization_id: i32,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyDeletedEvent {
    pub survey_id: i32,
    pub survey_name: String,
    pub organization_id: i32,
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSubmittedEvent {
    pub response_id: i32,
    pub survey_id: i32,
    pub organization_id: i32,
    pub channel: ResponseChannel,
}

/// Score for one category of the readiness framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub score: f64,
}

/// Emitted when the LLM classification of a response has finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentCompletedEvent {
    pub response_id: i32,
    pub survey_id: i32,
    pub organization_id: i32,
    pub readiness_tier: String,
    pub category_scores: Vec<CategoryScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGeneratedEvent {
    pub report_id: i32,
    pub survey_id: i32,
    pub organization_id: i32,
    pub user_id: Option<i32>,
}

/// Core event enum containing all domain events published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    SurveyCreated(SurveyCreatedEvent),
    SurveyUpdated(SurveyUpdatedEvent),
    SurveyDeleted(SurveyDeletedEvent),
    ResponseSubmitted(ResponseSubmittedEvent),
    AssessmentCompleted(AssessmentCompletedEvent),
    ReportGenerated(ReportGeneratedEvent),
}

impl AppEvent {
    /// Organization the event belongs to; every event is org-scoped.
    pub fn organization_id(&self) -> i32 {
        match self {
            AppEvent::SurveyCreated(e) => e.organization_id,
            AppEvent::SurveyUpdated(e) => e.organization_id,
            AppEvent::SurveyDeleted(e) => e.organization_id,
            AppEvent::ResponseSubmitted(e) => e.organization_id,
            AppEvent::AssessmentCompleted(e) => e.organization_id,
            AppEvent::ReportGenerated(e) => e.organization_id,
        }
    }

    /// Acting user, where the event was caused by one.
    pub fn user_id(&self) -> Option<i32> {
        match self {
            AppEvent::SurveyCreated(e) => e.user_id,
            AppEvent::SurveyUpdated(e) => e.user_id,
            AppEvent::SurveyDeleted(e) => e.user_id,
            AppEvent::ResponseSubmitted(_) => None,
            AppEvent::AssessmentCompleted(_) => None,
            AppEvent::ReportGenerated(e) => e.user_id,
        }
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::SurveyCreated(e) => {
                write!(f, "SurveyCreated(id: {}, name: {})", e.survey_id, e.survey_name)
            }
            AppEvent::SurveyUpdated(e) => {
                write!(f, "SurveyUpdated(id: {}, name: {})", e.survey_id, e.survey_name)
            }
            AppEvent::SurveyDeleted(e) => {
                write!(f, "SurveyDeleted(id: {}, name: {})", e.survey_id, e.survey_name)
            }
            AppEvent::ResponseSubmitted(e) => write!(
                f,
                "ResponseSubmitted(id: {}, survey: {}, channel: {:?})",
                e.response_id, e.survey_id, e.channel
            ),
            AppEvent::AssessmentCompleted(e) => write!(
                f,
                "AssessmentCompleted(response: {}, survey: {}, tier: {})",
                e.response_id, e.survey_id, e.readiness_tier
            ),
            AppEvent::ReportGenerated(e) => write!(
                f,
                "ReportGenerated(id: {}, survey: {})",
                e.report_id, e.survey_id
            ),
        }
    }
}

// Core bus abstraction - aira-queue implements this
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to send event: {0}")]
    SendError(String),
    #[error("Failed to receive event: {0}")]
    ReceiveError(String),
    #[error("Event channel closed")]
    ChannelClosed,
}

/// Core trait for publishing domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers
    async fn send(&self, event: AppEvent) -> Result<(), QueueError>;

    /// Create a new subscriber for events
    fn subscribe(&self) -> Box<dyn EventReceiver>;
}

/// Core trait for receiving domain events
#[async_trait]
pub trait EventReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Result<AppEvent, QueueError>;
}
