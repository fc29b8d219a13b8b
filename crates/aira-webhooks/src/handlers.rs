//! HTTP handlers for webhook management and event publication.

use crate::events::WebhookEventType;
use crate::service::{
    CreateWebhookRequest, TestDeliveryResult, UpdateWebhookRequest, WebhookError, WebhookService,
};
use aira_auth::{permission_guard, RequireAuth};
use aira_core::error_builder::ErrorBuilder;
use aira_core::problemdetails::Problem;
use aira_core::{mask_sensitive, RequestMetadata};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

/// Shared state for webhook handlers
pub struct WebhookState {
    pub webhook_service: Arc<WebhookService>,
}

impl WebhookState {
    pub fn new(webhook_service: Arc<WebhookService>) -> Self {
        Self { webhook_service }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_webhooks,
        get_webhook,
        create_webhook,
        update_webhook,
        delete_webhook,
        test_webhook,
        list_deliveries,
        list_event_types,
        publish_event,
    ),
    components(
        schemas(
            WebhookResponse,
            CreateWebhookRequestBody,
            UpdateWebhookRequestBody,
            DeliveryAttemptResponse,
            EventTypeResponse,
            TestDeliveryResult,
            PublishEventRequestBody,
            PublishedEventResponse,
        )
    ),
    info(
        title = "Aira Webhooks API",
        description = "API endpoints for managing webhook endpoints, delivery history and event publication",
        version = "1.0.0"
    ),
    tags(
        (name = "Webhooks", description = "Webhook endpoint management"),
        (name = "Webhook Deliveries", description = "Webhook delivery history and test deliveries"),
        (name = "Events", description = "Domain event publication")
    )
)]
pub struct WebhooksApiDoc;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub url: String,
    /// Masked everywhere except in the creation response
    #[schema(example = "whse***cdef")]
    pub secret: String,
    pub events: Vec<String>,
    pub active: bool,
    /// Custom headers sent with every delivery
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: i32,
    pub retry_count: i32,
    pub retry_delay_ms: i32,
    #[schema(example = "2026-01-15T10:00:00.000000Z")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[schema(example = "2026-01-15T10:00:00.000000Z")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<aira_entities::webhook_endpoints::Model> for WebhookResponse {
    fn from(endpoint: aira_entities::webhook_endpoints::Model) -> Self {
        let headers = endpoint
            .headers
            .as_deref()
            .and_then(|h| serde_json::from_str(h).ok());

        Self {
            id: endpoint.id,
            organization_id: endpoint.organization_id,
            name: endpoint.name,
            url: endpoint.url,
            secret: mask_sensitive(&endpoint.secret),
            events: endpoint.event_types(),
            active: endpoint.active,
            headers,
            timeout_ms: endpoint.timeout_ms,
            retry_count: endpoint.retry_count,
            retry_delay_ms: endpoint.retry_delay_ms,
            created_at: endpoint.created_at,
            updated_at: endpoint.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebhookRequestBody {
    /// Display name, 1 to 100 characters
    #[schema(example = "CRM sync")]
    pub name: String,
    /// Target URL for webhook delivery
    #[schema(example = "https://example.com/webhook")]
    pub url: String,
    /// HMAC secret; generated when omitted
    pub secret: Option<String>,
    /// Event types to subscribe to
    #[schema(example = json!(["survey.created", "assessment.completed"]))]
    pub events: Vec<String>,
    /// Whether the webhook receives deliveries
    #[schema(default = true)]
    pub active: Option<bool>,
    /// Custom headers sent with every delivery
    pub headers: Option<HashMap<String, String>>,
    /// Per-request timeout, 1000 to 60000 ms
    #[schema(default = 30000)]
    pub timeout_ms: Option<i32>,
    /// Retries after a failed attempt, 0 to 10
    #[schema(default = 3)]
    pub retry_count: Option<i32>,
    /// Base retry delay, 100 to 600000 ms
    #[schema(default = 1000)]
    pub retry_delay_ms: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWebhookRequestBody {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<i32>,
    pub retry_count: Option<i32>,
    pub retry_delay_ms: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryAttemptResponse {
    pub id: i32,
    pub webhook_id: i32,
    pub event_id: String,
    pub attempt_number: i32,
    pub url: String,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    #[schema(example = "2026-01-15T10:00:00.000000Z")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<aira_entities::webhook_delivery_attempts::Model> for DeliveryAttemptResponse {
    fn from(attempt: aira_entities::webhook_delivery_attempts::Model) -> Self {
        Self {
            id: attempt.id,
            webhook_id: attempt.webhook_id,
            event_id: attempt.event_id,
            attempt_number: attempt.attempt_number,
            url: attempt.url,
            status_code: attempt.status_code,
            response_body: attempt.response_body,
            error_message: attempt.error_message,
            duration_ms: attempt.duration_ms,
            created_at: attempt.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventTypeResponse {
    pub event_type: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishEventRequestBody {
    /// Event type in dotted form
    #[schema(example = "survey.created")]
    pub event_type: String,
    /// Opaque event payload, delivered verbatim to subscribers
    #[schema(value_type = Object)]
    pub data: Box<serde_json::value::RawValue>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishedEventResponse {
    pub id: String,
    pub event_type: String,
    pub request_id: String,
    #[schema(example = "2026-01-15T10:00:00.000000Z")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<aira_entities::webhook_events::Model> for PublishedEventResponse {
    fn from(event: aira_entities::webhook_events::Model) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            request_id: event.request_id,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDeliveriesQuery {
    pub limit: Option<u64>,
}

/// Parse event-type strings, rejecting unknown entries instead of dropping
/// them.
fn parse_event_types(entries: &[String]) -> Result<Vec<WebhookEventType>, Problem> {
    let mut events = Vec::with_capacity(entries.len());
    for entry in entries {
        match WebhookEventType::from_str(entry) {
            Some(event_type) => events.push(event_type),
            None => {
                return Err(ErrorBuilder::new(StatusCode::BAD_REQUEST)
                    .title("Invalid event types")
                    .detail(format!("Unknown event type: {}", entry))
                    .build())
            }
        }
    }

    Ok(events)
}

// ============================================================================
// Handlers
// ============================================================================

/// List all webhooks of the caller's organization
#[utoipa::path(
    get,
    path = "/webhooks",
    responses(
        (status = 200, description = "List of webhooks, newest first", body = Vec<WebhookResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn list_webhooks(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksRead);

    match state
        .webhook_service
        .list_endpoints(auth.organization_id)
        .await
    {
        Ok(endpoints) => {
            let responses: Vec<WebhookResponse> = endpoints.into_iter().map(Into::into).collect();
            Ok(Json(responses))
        }
        Err(e) => {
            error!("Failed to list webhooks: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to list webhooks")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Get a specific webhook
#[utoipa::path(
    get,
    path = "/webhooks/{webhook_id}",
    responses(
        (status = 200, description = "Webhook details", body = WebhookResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn get_webhook(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksRead);

    match state
        .webhook_service
        .get_endpoint(auth.organization_id, webhook_id)
        .await
    {
        Ok(Some(endpoint)) => Ok(Json(WebhookResponse::from(endpoint))),
        Ok(None) => Err(ErrorBuilder::new(StatusCode::NOT_FOUND)
            .title("Webhook not found")
            .build()),
        Err(e) => {
            error!("Failed to get webhook: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to get webhook")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Create a new webhook
#[utoipa::path(
    post,
    path = "/webhooks",
    request_body = CreateWebhookRequestBody,
    responses(
        (status = 201, description = "Webhook created; the full secret is only returned here", body = WebhookResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn create_webhook(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<CreateWebhookRequestBody>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksWrite);

    let events = parse_event_types(&body.events)?;

    let request = CreateWebhookRequest {
        name: body.name,
        url: body.url,
        secret: body.secret,
        events,
        active: body.active.unwrap_or(true),
        headers: body.headers,
        timeout_ms: body.timeout_ms,
        retry_count: body.retry_count,
        retry_delay_ms: body.retry_delay_ms,
    };

    match state
        .webhook_service
        .create_endpoint(auth.organization_id, auth.user_id(), request)
        .await
    {
        Ok(endpoint) => {
            info!(
                "Created webhook {} for organization {}",
                endpoint.id, auth.organization_id
            );
            let secret = endpoint.secret.clone();
            let mut response = WebhookResponse::from(endpoint);
            // The only response that ever carries the full secret
            response.secret = secret;
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(WebhookError::InvalidConfiguration(detail)) => {
            Err(ErrorBuilder::new(StatusCode::BAD_REQUEST)
                .title("Invalid webhook configuration")
                .detail(detail)
                .build())
        }
        Err(e) => {
            error!("Failed to create webhook: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to create webhook")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Update a webhook
#[utoipa::path(
    patch,
    path = "/webhooks/{webhook_id}",
    request_body = UpdateWebhookRequestBody,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn update_webhook(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
    Json(body): Json<UpdateWebhookRequestBody>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksWrite);

    let events = match &body.events {
        Some(entries) => Some(parse_event_types(entries)?),
        None => None,
    };

    let request = UpdateWebhookRequest {
        name: body.name,
        url: body.url,
        secret: body.secret,
        events,
        active: body.active,
        headers: body.headers,
        timeout_ms: body.timeout_ms,
        retry_count: body.retry_count,
        retry_delay_ms: body.retry_delay_ms,
    };

    match state
        .webhook_service
        .update_endpoint(auth.organization_id, auth.user_id(), webhook_id, request)
        .await
    {
        Ok(endpoint) => {
            info!("Updated webhook {}", webhook_id);
            Ok(Json(WebhookResponse::from(endpoint)))
        }
        Err(WebhookError::NotFound(_)) => Err(ErrorBuilder::new(StatusCode::NOT_FOUND)
            .title("Webhook not found")
            .build()),
        Err(WebhookError::InvalidConfiguration(detail)) => {
            Err(ErrorBuilder::new(StatusCode::BAD_REQUEST)
                .title("Invalid webhook configuration")
                .detail(detail)
                .build())
        }
        Err(e) => {
            error!("Failed to update webhook: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to update webhook")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Delete a webhook
#[utoipa::path(
    delete,
    path = "/webhooks/{webhook_id}",
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn delete_webhook(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksWrite);

    match state
        .webhook_service
        .delete_endpoint(auth.organization_id, auth.user_id(), webhook_id)
        .await
    {
        Ok(true) => {
            info!("Deleted webhook {}", webhook_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ErrorBuilder::new(StatusCode::NOT_FOUND)
            .title("Webhook not found")
            .build()),
        Err(e) => {
            error!("Failed to delete webhook: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to delete webhook")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Send a test delivery to a webhook
#[utoipa::path(
    post,
    path = "/webhooks/{webhook_id}/test",
    responses(
        (status = 200, description = "Test delivery result; nothing is persisted", body = TestDeliveryResult),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID")
    ),
    tag = "Webhook Deliveries",
    security(("bearer_auth" = []))
)]
async fn test_webhook(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksWrite);

    match state
        .webhook_service
        .test_endpoint(auth.organization_id, webhook_id)
        .await
    {
        Ok(result) => {
            info!(
                "Test delivery to webhook {}: success={}",
                webhook_id, result.success
            );
            Ok(Json(result))
        }
        Err(WebhookError::NotFound(_)) => Err(ErrorBuilder::new(StatusCode::NOT_FOUND)
            .title("Webhook not found")
            .build()),
        Err(e) => {
            error!("Failed to test webhook: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to test webhook")
                .detail(e.to_string())
                .build())
        }
    }
}

/// List the delivery history of a webhook
#[utoipa::path(
    get,
    path = "/webhooks/{webhook_id}/deliveries",
    responses(
        (status = 200, description = "Delivery attempts, newest first", body = Vec<DeliveryAttemptResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID"),
        ("limit" = Option<u64>, Query, description = "Number of attempts to return (default: 50, max: 100)")
    ),
    tag = "Webhook Deliveries",
    security(("bearer_auth" = []))
)]
async fn list_deliveries(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksRead);

    let limit = query.limit.unwrap_or(50);

    match state
        .webhook_service
        .get_delivery_history(auth.organization_id, webhook_id, limit)
        .await
    {
        Ok(attempts) => {
            let responses: Vec<DeliveryAttemptResponse> =
                attempts.into_iter().map(Into::into).collect();
            Ok(Json(responses))
        }
        Err(WebhookError::NotFound(_)) => Err(ErrorBuilder::new(StatusCode::NOT_FOUND)
            .title("Webhook not found")
            .build()),
        Err(e) => {
            error!("Failed to list deliveries: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to list deliveries")
                .detail(e.to_string())
                .build())
        }
    }
}

/// List available event types
#[utoipa::path(
    get,
    path = "/webhooks/event-types",
    responses(
        (status = 200, description = "Subscribable event types", body = Vec<EventTypeResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Webhooks",
    security(("bearer_auth" = []))
)]
async fn list_event_types(RequireAuth(auth): RequireAuth) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, WebhooksRead);

    let event_types = vec![
        EventTypeResponse {
            event_type: WebhookEventType::SurveyCreated.to_string(),
            description: "Triggered when a new survey is created".to_string(),
            category: "Survey".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::SurveyUpdated.to_string(),
            description: "Triggered when a survey is updated".to_string(),
            category: "Survey".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::SurveyDeleted.to_string(),
            description: "Triggered when a survey is deleted".to_string(),
            category: "Survey".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::ResponseSubmitted.to_string(),
            description: "Triggered when a respondent submits a survey response".to_string(),
            category: "Response".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::AssessmentCompleted.to_string(),
            description: "Triggered when the readiness assessment of a response has finished"
                .to_string(),
            category: "Assessment".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::ReportGenerated.to_string(),
            description: "Triggered when a readiness report is generated".to_string(),
            category: "Report".to_string(),
        },
        EventTypeResponse {
            event_type: WebhookEventType::WebhookDeliveryFailed.to_string(),
            description: "Triggered when a webhook delivery exhausts all retry attempts"
                .to_string(),
            category: "Webhook".to_string(),
        },
    ];

    Ok(Json(event_types))
}

/// Publish a domain event
#[utoipa::path(
    post,
    path = "/events",
    request_body = PublishEventRequestBody,
    responses(
        (status = 202, description = "Event persisted; deliveries run asynchronously", body = PublishedEventResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Events",
    security(("bearer_auth" = []))
)]
async fn publish_event(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<WebhookState>>,
    Extension(metadata): Extension<RequestMetadata>,
    Json(body): Json<PublishEventRequestBody>,
) -> Result<impl IntoResponse, Problem> {
    permission_guard!(auth, EventsPublish);

    let event_type = match WebhookEventType::from_str(&body.event_type) {
        Some(event_type) => event_type,
        None => {
            return Err(ErrorBuilder::new(StatusCode::BAD_REQUEST)
                .title("Unknown event type")
                .detail(format!("'{}' is not a known event type", body.event_type))
                .build())
        }
    };

    if matches!(
        event_type,
        WebhookEventType::WebhookTest | WebhookEventType::WebhookDeliveryFailed
    ) {
        return Err(ErrorBuilder::new(StatusCode::BAD_REQUEST)
            .title("Reserved event type")
            .detail(format!(
                "'{}' is emitted by the webhook system and cannot be published directly",
                event_type
            ))
            .build());
    }

    let new_event = crate::events::NewWebhookEvent {
        event_type,
        data: body.data.get().to_string(),
        organization_id: auth.organization_id,
        user_id: Some(auth.user_id()),
        request_id: metadata.request_id.clone(),
    };

    match state.webhook_service.trigger_event(new_event).await {
        Ok(event) => {
            info!("Published event {} ({})", event.id, event.event_type);
            Ok((
                StatusCode::ACCEPTED,
                Json(PublishedEventResponse::from(event)),
            ))
        }
        Err(e) => {
            error!("Failed to publish event: {}", e);
            Err(ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to publish event")
                .detail(e.to_string())
                .build())
        }
    }
}

/// Configure webhook routes
pub fn configure_routes() -> Router<Arc<WebhookState>> {
    Router::new()
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route("/webhooks/event-types", get(list_event_types))
        .route(
            "/webhooks/{webhook_id}",
            get(get_webhook)
                .patch(update_webhook)
                .delete(delete_webhook),
        )
        .route("/webhooks/{webhook_id}/test", post(test_webhook))
        .route("/webhooks/{webhook_id}/deliveries", get(list_deliveries))
        .route("/events", post(publish_event))
}
