use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Event types that webhook endpoints can be notified about.
///
/// The dotted form (`survey.created`) is the canonical wire representation;
/// it is what gets stored in `webhook_events.event_type` and sent in delivery
/// payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    SurveyCreated,
    SurveyUpdated,
    SurveyDeleted,
    ResponseSubmitted,
    AssessmentCompleted,
    ReportGenerated,
    /// Synthetic event used for test deliveries only. Not subscribable.
    WebhookTest,
    /// Emitted when a delivery exhausts all retry attempts.
    WebhookDeliveryFailed,
}

impl WebhookEventType {
    /// All event types an endpoint may subscribe to.
    ///
    /// `webhook.test` is excluded: it only exists for explicit test
    /// deliveries and never fans out to subscribers.
    pub fn all() -> Vec<WebhookEventType> {
        vec![
            WebhookEventType::SurveyCreated,
            WebhookEventType::SurveyUpdated,
            WebhookEventType::SurveyDeleted,
            WebhookEventType::ResponseSubmitted,
            WebhookEventType::AssessmentCompleted,
            WebhookEventType::ReportGenerated,
            WebhookEventType::WebhookDeliveryFailed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::SurveyCreated => "survey.created",
            WebhookEventType::SurveyUpdated => "survey.updated",
            WebhookEventType::SurveyDeleted => "survey.deleted",
            WebhookEventType::ResponseSubmitted => "response.submitted",
            WebhookEventType::AssessmentCompleted => "assessment.completed",
            WebhookEventType::ReportGenerated => "report.generated",
            WebhookEventType::WebhookTest => "webhook.test",
            WebhookEventType::WebhookDeliveryFailed => "webhook.delivery_failed",
        }
    }

    /// Parses both the dotted form and the snake_case serde form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "survey.created" | "survey_created" => Some(WebhookEventType::SurveyCreated),
            "survey.updated" | "survey_updated" => Some(WebhookEventType::SurveyUpdated),
            "survey.deleted" | "survey_deleted" => Some(WebhookEventType::SurveyDeleted),
            "response.submitted" | "response_submitted" => {
                Some(WebhookEventType::ResponseSubmitted)
            }
            "assessment.completed" | "assessment_completed" => {
                Some(WebhookEventType::AssessmentCompleted)
            }
            "report.generated" | "report_generated" => Some(WebhookEventType::ReportGenerated),
            "webhook.test" | "webhook_test" => Some(WebhookEventType::WebhookTest),
            "webhook.delivery_failed" | "webhook_delivery_failed" => {
                Some(WebhookEventType::WebhookDeliveryFailed)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain event about to enter the webhook pipeline.
///
/// `data` is the event payload as raw JSON text. It is stored verbatim and
/// embedded verbatim into delivery bodies, so whatever key order the producer
/// serialized is what receivers see.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_type: WebhookEventType,
    pub data: String,
    pub organization_id: i32,
    pub user_id: Option<i32>,
    pub request_id: String,
}

/// Payload of a `webhook.delivery_failed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailedPayload {
    /// Id of the event whose delivery was exhausted
    pub event_id: String,
    /// Type of the event whose delivery was exhausted
    pub event_type: String,
    pub webhook_id: i32,
    pub webhook_name: String,
    pub url: String,
    /// Total attempts made before giving up
    pub attempts: i32,
    pub last_error: String,
}
