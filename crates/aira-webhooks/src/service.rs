//! Webhook endpoint registry and delivery orchestration.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use aira_database::DbConnection;
use aira_entities::{webhook_delivery_attempts, webhook_endpoints, webhook_events};

use crate::delivery::{AttemptOutcome, DeliveryClient};
use crate::events::{DeliveryFailedPayload, NewWebhookEvent, WebhookEventType};

const DEFAULT_TIMEOUT_MS: i32 = 30000;
const DEFAULT_RETRY_COUNT: i32 = 3;
const DEFAULT_RETRY_DELAY_MS: i32 = 1000;

const TIMEOUT_MS_RANGE: std::ops::RangeInclusive<i32> = 1000..=60000;
const RETRY_COUNT_RANGE: std::ops::RangeInclusive<i32> = 0..=10;
const RETRY_DELAY_MS_RANGE: std::ops::RangeInclusive<i32> = 100..=600_000;

/// History queries never return more rows than this, whatever the caller asks
/// for.
const MAX_HISTORY_LIMIT: u64 = 100;

/// Webhook service errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Webhook not found: {0}")]
    NotFound(i32),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Request to create a webhook endpoint.
#[derive(Debug, Clone)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    /// Generated (`whsec_` + 64 hex chars) when not provided
    pub secret: Option<String>,
    pub events: Vec<WebhookEventType>,
    pub active: bool,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<i32>,
    pub retry_count: Option<i32>,
    pub retry_delay_ms: Option<i32>,
}

/// Partial update of a webhook endpoint. `None` fields keep their stored
/// value.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub events: Option<Vec<WebhookEventType>>,
    pub active: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_ms: Option<i32>,
    pub retry_count: Option<i32>,
    pub retry_delay_ms: Option<i32>,
}

/// Result of a test delivery, returned directly to the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TestDeliveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl From<AttemptOutcome> for TestDeliveryResult {
    fn from(outcome: AttemptOutcome) -> Self {
        let success = outcome.is_success();
        let duration_ms = outcome.duration().as_millis() as i64;

        match outcome {
            AttemptOutcome::Completed { status, body, .. } => Self {
                success,
                status_code: Some(status),
                response: (!body.is_empty()).then_some(body),
                error: None,
                duration_ms,
            },
            AttemptOutcome::Failed { error, .. } => Self {
                success: false,
                status_code: None,
                response: None,
                error: Some(error),
                duration_ms,
            },
        }
    }
}

/// Manages webhook endpoints and orchestrates event deliveries.
///
/// Cloning is cheap; clones share the database handle and HTTP client.
#[derive(Clone)]
pub struct WebhookService {
    db: Arc<DbConnection>,
    delivery_client: Arc<DeliveryClient>,
}

impl WebhookService {
    pub fn new(db: Arc<DbConnection>, delivery_client: Arc<DeliveryClient>) -> Self {
        Self {
            db,
            delivery_client,
        }
    }

    /// Creates a webhook endpoint for an organization.
    ///
    /// Generates a secret when the caller did not supply one. The returned
    /// model carries the full secret; API responses mask it everywhere except
    /// at creation time.
    pub async fn create_endpoint(
        &self,
        organization_id: i32,
        user_id: i32,
        request: CreateWebhookRequest,
    ) -> Result<webhook_endpoints::Model, WebhookError> {
        validate_name(&request.name)?;
        validate_url(&request.url)?;
        validate_events(&request.events)?;
        let timeout_ms = validate_timeout_ms(request.timeout_ms)?;
        let retry_count = validate_retry_count(request.retry_count)?;
        let retry_delay_ms = validate_retry_delay_ms(request.retry_delay_ms)?;

        let secret = request.secret.unwrap_or_else(generate_webhook_secret);
        let events = serialize_events(&request.events)?;
        let headers = match &request.headers {
            Some(headers) => Some(serde_json::to_string(headers)?),
            None => None,
        };

        let endpoint = webhook_endpoints::ActiveModel {
            organization_id: Set(organization_id),
            user_id: Set(user_id),
            name: Set(request.name),
            url: Set(request.url),
            secret: Set(secret),
            events: Set(events),
            active: Set(request.active),
            headers: Set(headers),
            timeout_ms: Set(timeout_ms),
            retry_count: Set(retry_count),
            retry_delay_ms: Set(retry_delay_ms),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(
            "Created webhook endpoint {} '{}' for organization {}",
            endpoint.id, endpoint.name, organization_id
        );

        Ok(endpoint)
    }

    /// Lists all endpoints of an organization, newest first.
    pub async fn list_endpoints(
        &self,
        organization_id: i32,
    ) -> Result<Vec<webhook_endpoints::Model>, WebhookError> {
        let endpoints = webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::OrganizationId.eq(organization_id))
            .order_by_desc(webhook_endpoints::Column::CreatedAt)
            .order_by_desc(webhook_endpoints::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(endpoints)
    }

    /// Fetches one endpoint, scoped to the organization.
    ///
    /// Endpoints of other organizations are indistinguishable from missing
    /// ones.
    pub async fn get_endpoint(
        &self,
        organization_id: i32,
        id: i32,
    ) -> Result<Option<webhook_endpoints::Model>, WebhookError> {
        let endpoint = webhook_endpoints::Entity::find_by_id(id)
            .filter(webhook_endpoints::Column::OrganizationId.eq(organization_id))
            .one(self.db.as_ref())
            .await?;

        Ok(endpoint)
    }

    /// Applies a partial update to an endpoint.
    ///
    /// Changed fields are re-validated; everything else keeps its stored
    /// value. `updated_at` is bumped on every successful update.
    pub async fn update_endpoint(
        &self,
        organization_id: i32,
        user_id: i32,
        id: i32,
        request: UpdateWebhookRequest,
    ) -> Result<webhook_endpoints::Model, WebhookError> {
        let endpoint = self
            .get_endpoint(organization_id, id)
            .await?
            .ok_or(WebhookError::NotFound(id))?;

        let mut active_model: webhook_endpoints::ActiveModel = endpoint.into();

        if let Some(name) = request.name {
            validate_name(&name)?;
            active_model.name = Set(name);
        }
        if let Some(url) = request.url {
            validate_url(&url)?;
            active_model.url = Set(url);
        }
        if let Some(events) = request.events {
            validate_events(&events)?;
            active_model.events = Set(serialize_events(&events)?);
        }
        if let Some(secret) = request.secret {
            active_model.secret = Set(secret);
        }
        if let Some(active) = request.active {
            active_model.active = Set(active);
        }
        if let Some(headers) = request.headers {
            active_model.headers = Set(Some(serde_json::to_string(&headers)?));
        }
        if let Some(timeout_ms) = request.timeout_ms {
            active_model.timeout_ms = Set(validate_timeout_ms(Some(timeout_ms))?);
        }
        if let Some(retry_count) = request.retry_count {
            active_model.retry_count = Set(validate_retry_count(Some(retry_count))?);
        }
        if let Some(retry_delay_ms) = request.retry_delay_ms {
            active_model.retry_delay_ms = Set(validate_retry_delay_ms(Some(retry_delay_ms))?);
        }

        let updated = active_model.update(self.db.as_ref()).await?;

        info!(
            "User {} updated webhook endpoint {} for organization {}",
            user_id, updated.id, organization_id
        );

        Ok(updated)
    }

    /// Hard-deletes an endpoint and, via cascade, its delivery history.
    ///
    /// Scoped to the creating user within the organization; anything else
    /// reads as not found.
    pub async fn delete_endpoint(
        &self,
        organization_id: i32,
        user_id: i32,
        id: i32,
    ) -> Result<bool, WebhookError> {
        let result = webhook_endpoints::Entity::delete_many()
            .filter(webhook_endpoints::Column::Id.eq(id))
            .filter(webhook_endpoints::Column::OrganizationId.eq(organization_id))
            .filter(webhook_endpoints::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected > 0 {
            info!("Deleted webhook endpoint {}", id);
        }

        Ok(result.rows_affected > 0)
    }

    /// Publishes a domain event into the webhook pipeline.
    ///
    /// The event row is persisted first and is the only failure the caller
    /// can see. Delivery to each subscribed active endpoint runs in detached
    /// tasks; the call returns as soon as they are spawned.
    pub async fn trigger_event(
        &self,
        event: NewWebhookEvent,
    ) -> Result<webhook_events::Model, WebhookError> {
        let event_model = webhook_events::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            event_type: Set(event.event_type.to_string()),
            payload: Set(event.data),
            organization_id: Set(event.organization_id),
            user_id: Set(event.user_id),
            request_id: Set(event.request_id),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        let endpoints = webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::OrganizationId.eq(event_model.organization_id))
            .filter(webhook_endpoints::Column::Active.eq(true))
            .all(self.db.as_ref())
            .await?;

        let mut dispatched = 0;
        for endpoint in endpoints {
            if !endpoint.subscribes_to(&event_model.event_type) {
                continue;
            }

            dispatched += 1;
            let service = self.clone();
            let event = event_model.clone();
            tokio::spawn(async move {
                service.deliver_with_retries(event, endpoint).await;
            });
        }

        info!(
            "📨 Event {} ({}) dispatched to {} endpoint(s)",
            event_model.id, event_model.event_type, dispatched
        );

        Ok(event_model)
    }

    /// Sends a synthetic `webhook.test` delivery to an endpoint.
    ///
    /// Exactly one attempt, no retries, and neither the event nor the attempt
    /// is persisted. The outcome goes straight back to the caller.
    pub async fn test_endpoint(
        &self,
        organization_id: i32,
        id: i32,
    ) -> Result<TestDeliveryResult, WebhookError> {
        let endpoint = self
            .get_endpoint(organization_id, id)
            .await?
            .ok_or(WebhookError::NotFound(id))?;

        let payload = serde_json::json!({
            "message": "Test delivery from Aira",
            "webhook_id": endpoint.id,
            "webhook_name": endpoint.name,
        });

        let event = webhook_events::Model {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: WebhookEventType::WebhookTest.to_string(),
            payload: payload.to_string(),
            organization_id,
            user_id: None,
            request_id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
        };

        let outcome = self.delivery_client.attempt(&event, &endpoint, 1).await;

        info!(
            "Test delivery to webhook {}: success={}",
            endpoint.id,
            outcome.is_success()
        );

        Ok(TestDeliveryResult::from(outcome))
    }

    /// Returns the delivery audit trail for an endpoint, newest first.
    ///
    /// `limit` is capped at [`MAX_HISTORY_LIMIT`].
    pub async fn get_delivery_history(
        &self,
        organization_id: i32,
        id: i32,
        limit: u64,
    ) -> Result<Vec<webhook_delivery_attempts::Model>, WebhookError> {
        let endpoint = self
            .get_endpoint(organization_id, id)
            .await?
            .ok_or(WebhookError::NotFound(id))?;

        let attempts = webhook_delivery_attempts::Entity::find()
            .filter(webhook_delivery_attempts::Column::WebhookId.eq(endpoint.id))
            .order_by_desc(webhook_delivery_attempts::Column::CreatedAt)
            .order_by_desc(webhook_delivery_attempts::Column::Id)
            .limit(limit.min(MAX_HISTORY_LIMIT))
            .all(self.db.as_ref())
            .await?;

        Ok(attempts)
    }

    /// Runs the full retry loop for one endpoint.
    ///
    /// Every physical HTTP attempt gets exactly one audit row. The delay
    /// between attempts grows linearly: `retry_delay_ms * attempt_number`
    /// after the n-th failure.
    async fn deliver_with_retries(
        &self,
        event: webhook_events::Model,
        endpoint: webhook_endpoints::Model,
    ) {
        let max_attempts = endpoint.retry_count + 1;
        let mut last_error = String::new();

        for attempt_number in 1..=max_attempts {
            let outcome = self
                .delivery_client
                .attempt(&event, &endpoint, attempt_number)
                .await;
            self.record_attempt(&event, &endpoint, attempt_number, &outcome)
                .await;

            if outcome.is_success() {
                info!(
                    "✅ Delivered event {} to webhook {} on attempt {}/{}",
                    event.id, endpoint.id, attempt_number, max_attempts
                );
                return;
            }

            last_error = outcome.describe_failure();
            warn!(
                "⚠️ Delivery of event {} to webhook {} failed on attempt {}/{}: {}",
                event.id, endpoint.id, attempt_number, max_attempts, last_error
            );

            if attempt_number < max_attempts {
                let delay =
                    Duration::from_millis(endpoint.retry_delay_ms as u64 * attempt_number as u64);
                tokio::time::sleep(delay).await;
            }
        }

        error!(
            "❌ Exhausted {} attempt(s) delivering event {} to webhook {}: {}",
            max_attempts, event.id, endpoint.id, last_error
        );

        self.report_delivery_failure(&event, &endpoint, max_attempts, last_error)
            .await;
    }

    /// Emits a `webhook.delivery_failed` event after an exhausted delivery.
    ///
    /// Failure events that themselves fail to deliver are not reported again.
    async fn report_delivery_failure(
        &self,
        event: &webhook_events::Model,
        endpoint: &webhook_endpoints::Model,
        attempts: i32,
        last_error: String,
    ) {
        if event.event_type == WebhookEventType::WebhookDeliveryFailed.as_str() {
            return;
        }

        let payload = DeliveryFailedPayload {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            webhook_id: endpoint.id,
            webhook_name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            attempts,
            last_error,
        };

        let data = match serde_json::to_string(&payload) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize delivery failure payload: {}", e);
                return;
            }
        };

        let failure_event = NewWebhookEvent {
            event_type: WebhookEventType::WebhookDeliveryFailed,
            data,
            organization_id: endpoint.organization_id,
            user_id: None,
            request_id: event.request_id.clone(),
        };

        // trigger_event recurses through this path; box the future to keep it sized
        let trigger: Pin<
            Box<dyn Future<Output = Result<webhook_events::Model, WebhookError>> + Send + '_>,
        > = Box::pin(self.trigger_event(failure_event));

        if let Err(e) = trigger.await {
            error!(
                "Failed to trigger delivery failure event for webhook {}: {}",
                endpoint.id, e
            );
        }
    }

    /// Persists one delivery attempt. Audit failures are logged, never fatal.
    async fn record_attempt(
        &self,
        event: &webhook_events::Model,
        endpoint: &webhook_endpoints::Model,
        attempt_number: i32,
        outcome: &AttemptOutcome,
    ) {
        let (status_code, response_body, error_message) = match outcome {
            AttemptOutcome::Completed { status, body, .. } => {
                let body = (!body.is_empty()).then(|| body.clone());
                (Some(*status as i32), body, None)
            }
            AttemptOutcome::Failed { error, .. } => (None, None, Some(error.clone())),
        };

        let attempt = webhook_delivery_attempts::ActiveModel {
            webhook_id: Set(endpoint.id),
            event_id: Set(event.id.clone()),
            attempt_number: Set(attempt_number),
            url: Set(endpoint.url.clone()),
            status_code: Set(status_code),
            response_body: Set(response_body),
            error_message: Set(error_message),
            duration_ms: Set(outcome.duration().as_millis() as i64),
            ..Default::default()
        };

        if let Err(e) = attempt.insert(self.db.as_ref()).await {
            error!(
                "Failed to record delivery attempt for event {}: {}",
                event.id, e
            );
        }
    }
}

fn validate_name(name: &str) -> Result<(), WebhookError> {
    if name.trim().is_empty() {
        return Err(WebhookError::InvalidConfiguration(
            "Webhook name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > 100 {
        return Err(WebhookError::InvalidConfiguration(
            "Webhook name must be at most 100 characters".to_string(),
        ));
    }

    Ok(())
}

fn validate_url(url: &str) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidConfiguration(format!("Invalid webhook URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WebhookError::InvalidConfiguration(format!(
            "Webhook URL must use http or https, got '{}'",
            other
        ))),
    }
}

fn validate_events(events: &[WebhookEventType]) -> Result<(), WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::InvalidConfiguration(
            "At least one event type must be subscribed".to_string(),
        ));
    }

    let subscribable = WebhookEventType::all();
    for event in events {
        if !subscribable.contains(event) {
            return Err(WebhookError::InvalidConfiguration(format!(
                "Event type '{}' cannot be subscribed to",
                event
            )));
        }
    }

    Ok(())
}

fn validate_timeout_ms(value: Option<i32>) -> Result<i32, WebhookError> {
    let value = value.unwrap_or(DEFAULT_TIMEOUT_MS);
    if !TIMEOUT_MS_RANGE.contains(&value) {
        return Err(WebhookError::InvalidConfiguration(format!(
            "timeout_ms must be between {} and {}",
            TIMEOUT_MS_RANGE.start(),
            TIMEOUT_MS_RANGE.end()
        )));
    }

    Ok(value)
}

fn validate_retry_count(value: Option<i32>) -> Result<i32, WebhookError> {
    let value = value.unwrap_or(DEFAULT_RETRY_COUNT);
    if !RETRY_COUNT_RANGE.contains(&value) {
        return Err(WebhookError::InvalidConfiguration(format!(
            "retry_count must be between {} and {}",
            RETRY_COUNT_RANGE.start(),
            RETRY_COUNT_RANGE.end()
        )));
    }

    Ok(value)
}

fn validate_retry_delay_ms(value: Option<i32>) -> Result<i32, WebhookError> {
    let value = value.unwrap_or(DEFAULT_RETRY_DELAY_MS);
    if !RETRY_DELAY_MS_RANGE.contains(&value) {
        return Err(WebhookError::InvalidConfiguration(format!(
            "retry_delay_ms must be between {} and {}",
            RETRY_DELAY_MS_RANGE.start(),
            RETRY_DELAY_MS_RANGE.end()
        )));
    }

    Ok(value)
}

fn serialize_events(events: &[WebhookEventType]) -> Result<String, WebhookError> {
    let strings: Vec<&str> = events.iter().map(|e| e.as_str()).collect();
    Ok(serde_json::to_string(&strings)?)
}

/// `whsec_` followed by 64 hex chars (32 random bytes).
fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aira_database::test_utils::TestDatabase;
    use aira_entities::{organizations, users};

    async fn setup() -> (TestDatabase, WebhookService, i32, i32) {
        let test_db = TestDatabase::new().await.unwrap();
        let service = WebhookService::new(
            test_db.connection_arc(),
            Arc::new(DeliveryClient::new()),
        );

        let (org_id, user_id) = seed_org(&test_db, "Acme").await;
        (test_db, service, org_id, user_id)
    }

    async fn seed_org(test_db: &TestDatabase, name: &str) -> (i32, i32) {
        let org = organizations::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(format!("{}-{}", name.to_lowercase(), uuid::Uuid::new_v4())),
            ..Default::default()
        }
        .insert(test_db.connection())
        .await
        .unwrap();

        let user = users::ActiveModel {
            organization_id: Set(org.id),
            name: Set("Test Admin".to_string()),
            email: Set(format!("{}@example.com", uuid::Uuid::new_v4())),
            role: Set("admin".to_string()),
            ..Default::default()
        }
        .insert(test_db.connection())
        .await
        .unwrap();

        (org.id, user.id)
    }

    fn create_request(url: &str) -> CreateWebhookRequest {
        CreateWebhookRequest {
            name: "CRM sync".to_string(),
            url: url.to_string(),
            secret: None,
            events: vec![WebhookEventType::SurveyCreated],
            active: true,
            headers: None,
            timeout_ms: None,
            retry_count: None,
            retry_delay_ms: None,
        }
    }

    #[tokio::test]
    async fn test_create_endpoint_generates_secret_and_defaults() {
        let (_db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        assert!(endpoint.secret.starts_with("whsec_"));
        assert_eq!(endpoint.secret.len(), "whsec_".len() + 64);
        assert_eq!(endpoint.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(endpoint.retry_count, DEFAULT_RETRY_COUNT);
        assert_eq!(endpoint.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
        assert_eq!(endpoint.events, r#"["survey.created"]"#);
        assert!(endpoint.active);
    }

    #[tokio::test]
    async fn test_create_endpoint_keeps_provided_secret() {
        let (_db, service, org_id, user_id) = setup().await;

        let mut request = create_request("https://example.com/hooks");
        request.secret = Some("whsec_custom".to_string());

        let endpoint = service
            .create_endpoint(org_id, user_id, request)
            .await
            .unwrap();
        assert_eq!(endpoint.secret, "whsec_custom");
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_bad_urls() {
        let (_db, service, org_id, user_id) = setup().await;

        for url in ["ftp://example.com/hooks", "not a url", "/relative/path"] {
            let err = service
                .create_endpoint(org_id, user_id, create_request(url))
                .await
                .unwrap_err();
            assert!(
                matches!(err, WebhookError::InvalidConfiguration(_)),
                "url '{}' should be rejected",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_bad_names() {
        let (_db, service, org_id, user_id) = setup().await;

        let mut request = create_request("https://example.com/hooks");
        request.name = String::new();
        let err = service
            .create_endpoint(org_id, user_id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidConfiguration(_)));

        let mut request = create_request("https://example.com/hooks");
        request.name = "x".repeat(101);
        let err = service
            .create_endpoint(org_id, user_id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidConfiguration(_)));

        let mut request = create_request("https://example.com/hooks");
        request.name = "x".repeat(100);
        assert!(service.create_endpoint(org_id, user_id, request).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_empty_events() {
        let (_db, service, org_id, user_id) = setup().await;

        let mut request = create_request("https://example.com/hooks");
        request.events = vec![];

        let err = service
            .create_endpoint(org_id, user_id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_create_endpoint_rejects_test_event_subscription() {
        let (_db, service, org_id, user_id) = setup().await;

        let mut request = create_request("https://example.com/hooks");
        request.events = vec![WebhookEventType::WebhookTest];

        let err = service
            .create_endpoint(org_id, user_id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_create_endpoint_validates_bounds() {
        let (_db, service, org_id, user_id) = setup().await;

        let cases: Vec<(Option<i32>, Option<i32>, Option<i32>)> = vec![
            (Some(999), None, None),
            (Some(60001), None, None),
            (None, Some(-1), None),
            (None, Some(11), None),
            (None, None, Some(99)),
            (None, None, Some(600_001)),
        ];

        for (timeout_ms, retry_count, retry_delay_ms) in cases {
            let mut request = create_request("https://example.com/hooks");
            request.timeout_ms = timeout_ms;
            request.retry_count = retry_count;
            request.retry_delay_ms = retry_delay_ms;

            let err = service
                .create_endpoint(org_id, user_id, request)
                .await
                .unwrap_err();
            assert!(
                matches!(err, WebhookError::InvalidConfiguration(_)),
                "bounds ({:?}, {:?}, {:?}) should be rejected",
                timeout_ms,
                retry_count,
                retry_delay_ms
            );
        }
    }

    #[tokio::test]
    async fn test_list_endpoints_newest_first() {
        let (_db, service, org_id, user_id) = setup().await;

        let first = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/a"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/b"))
            .await
            .unwrap();

        let endpoints = service.list_endpoints(org_id).await.unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].id, second.id);
        assert_eq!(endpoints[1].id, first.id);
    }

    #[tokio::test]
    async fn test_get_endpoint_scoped_to_organization() {
        let (db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        let (other_org_id, _) = seed_org(&db, "Globex").await;

        let found = service.get_endpoint(org_id, endpoint.id).await.unwrap();
        assert!(found.is_some());

        let cross_org = service
            .get_endpoint(other_org_id, endpoint.id)
            .await
            .unwrap();
        assert!(cross_org.is_none());
    }

    #[tokio::test]
    async fn test_update_endpoint_partial_merge() {
        let (_db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let updated = service
            .update_endpoint(
                org_id,
                user_id,
                endpoint.id,
                UpdateWebhookRequest {
                    name: Some("Renamed".to_string()),
                    retry_count: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.retry_count, 5);
        assert_eq!(updated.url, endpoint.url);
        assert_eq!(updated.secret, endpoint.secret);
        assert!(updated.updated_at > endpoint.updated_at);
    }

    #[tokio::test]
    async fn test_update_endpoint_revalidates() {
        let (_db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        let err = service
            .update_endpoint(
                org_id,
                user_id,
                endpoint.id,
                UpdateWebhookRequest {
                    url: Some("ftp://example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidConfiguration(_)));

        let unchanged = service
            .get_endpoint(org_id, endpoint.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.url, "https://example.com/hooks");
    }

    #[tokio::test]
    async fn test_update_endpoint_cross_org_is_not_found() {
        let (db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        let (other_org_id, other_user_id) = seed_org(&db, "Globex").await;

        let err = service
            .update_endpoint(
                other_org_id,
                other_user_id,
                endpoint.id,
                UpdateWebhookRequest {
                    name: Some("Hijacked".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_endpoint_scoped_to_user_and_org() {
        let (db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        let (_, other_user_id) = seed_org(&db, "Globex").await;

        let deleted = service
            .delete_endpoint(org_id, other_user_id, endpoint.id)
            .await
            .unwrap();
        assert!(!deleted);
        assert!(service
            .get_endpoint(org_id, endpoint.id)
            .await
            .unwrap()
            .is_some());

        let deleted = service
            .delete_endpoint(org_id, user_id, endpoint.id)
            .await
            .unwrap();
        assert!(deleted);
        assert!(service
            .get_endpoint(org_id, endpoint.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_trigger_event_persists_without_subscribers() {
        let (db, service, org_id, user_id) = setup().await;

        let event = service
            .trigger_event(NewWebhookEvent {
                event_type: WebhookEventType::SurveyCreated,
                data: r#"{"survey_id":1}"#.to_string(),
                organization_id: org_id,
                user_id: Some(user_id),
                request_id: "req-1".to_string(),
            })
            .await
            .unwrap();

        let stored = webhook_events::Entity::find_by_id(event.id.clone())
            .one(db.connection())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.event_type, "survey.created");
        assert_eq!(stored.payload, r#"{"survey_id":1}"#);
        assert_eq!(stored.request_id, "req-1");

        let attempts = webhook_delivery_attempts::Entity::find()
            .all(db.connection())
            .await
            .unwrap();
        assert!(attempts.is_empty());
    }

    #[tokio::test]
    async fn test_test_endpoint_unknown_is_not_found() {
        let (_db, service, org_id, _user_id) = setup().await;

        let err = service.test_endpoint(org_id, 9999).await.unwrap_err();
        assert!(matches!(err, WebhookError::NotFound(9999)));
    }

    #[tokio::test]
    async fn test_delivery_history_scoped_and_limited() {
        let (db, service, org_id, user_id) = setup().await;

        let endpoint = service
            .create_endpoint(org_id, user_id, create_request("https://example.com/hooks"))
            .await
            .unwrap();

        // Not a subscribed type, so no delivery tasks interfere with the
        // rows inserted below
        let event = service
            .trigger_event(NewWebhookEvent {
                event_type: WebhookEventType::ReportGenerated,
                data: "{}".to_string(),
                organization_id: org_id,
                user_id: None,
                request_id: "req-1".to_string(),
            })
            .await
            .unwrap();

        for attempt_number in 1..=3 {
            webhook_delivery_attempts::ActiveModel {
                webhook_id: Set(endpoint.id),
                event_id: Set(event.id.clone()),
                attempt_number: Set(attempt_number),
                url: Set(endpoint.url.clone()),
                status_code: Set(Some(500)),
                response_body: Set(None),
                error_message: Set(None),
                duration_ms: Set(10),
                ..Default::default()
            }
            .insert(db.connection())
            .await
            .unwrap();
        }

        let history = service
            .get_delivery_history(org_id, endpoint.id, 2)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].attempt_number, 3);
        assert_eq!(history[1].attempt_number, 2);

        let (other_org_id, _) = seed_org(&db, "Globex").await;
        let err = service
            .get_delivery_history(other_org_id, endpoint.id, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::NotFound(_)));
    }
}
