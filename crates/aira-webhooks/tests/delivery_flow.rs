//! End-to-end delivery tests against a local capturing receiver
//!
//! These tests bind a real HTTP server on a loopback port, register webhook
//! endpoints pointing at it, and verify the delivered bytes, signatures,
//! retry behavior and failure reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use tokio::sync::Mutex;

use aira_database::test_utils::{wait_for, TestDatabase};
use aira_entities::{organizations, users, webhook_delivery_attempts, webhook_events};
use aira_webhooks::{
    verify_signature, CreateWebhookRequest, DeliveryClient, DeliveryFailedPayload, NewWebhookEvent,
    WebhookEventType, WebhookService, USER_AGENT,
};

#[derive(Clone)]
struct CapturedRequest {
    headers: HeaderMap,
    body: Bytes,
}

/// Local HTTP receiver that records every request and answers with a
/// scripted status sequence (the last status repeats once the script runs
/// out).
struct CapturingReceiver {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CapturingReceiver {
    async fn start(statuses: Vec<u16>) -> Self {
        Self::start_with_delay(statuses, None).await
    }

    async fn start_with_delay(statuses: Vec<u16>, delay: Option<Duration>) -> Self {
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(statuses));

        let captured = requests.clone();
        let app = Router::new().route(
            "/hooks",
            post(move |headers: HeaderMap, body: Bytes| {
                let captured = captured.clone();
                let script = script.clone();
                async move {
                    captured.lock().await.push(CapturedRequest { headers, body });

                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }

                    let mut script = script.lock().await;
                    let status = if script.len() > 1 {
                        script.remove(0)
                    } else {
                        script.first().copied().unwrap_or(200)
                    };

                    (
                        StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
                        "received",
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    fn url(&self) -> String {
        format!("http://{}/hooks", self.addr)
    }

    async fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn setup() -> (TestDatabase, WebhookService, i32, i32) {
    let test_db = TestDatabase::new().await.unwrap();
    let service = WebhookService::new(test_db.connection_arc(), Arc::new(DeliveryClient::new()));
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
        name: Set("Admin".to_string()),
        email: Set(format!("admin-{}@example.com", uuid::Uuid::new_v4())),
        role: Set("admin".to_string()),
        ..Default::default()
    }
    .insert(test_db.connection())
    .await
    .unwrap();

    (org.id, user.id)
}

async fn create_endpoint(
    service: &WebhookService,
    org_id: i32,
    user_id: i32,
    url: &str,
    events: Vec<WebhookEventType>,
    retry_count: i32,
    retry_delay_ms: i32,
) -> aira_entities::webhook_endpoints::Model {
    service
        .create_endpoint(
            org_id,
            user_id,
            CreateWebhookRequest {
                name: "Test receiver".to_string(),
                url: url.to_string(),
                secret: None,
                events,
                active: true,
                headers: None,
                timeout_ms: Some(5000),
                retry_count: Some(retry_count),
                retry_delay_ms: Some(retry_delay_ms),
            },
        )
        .await
        .unwrap()
}

fn new_event(
    org_id: i32,
    user_id: i32,
    event_type: WebhookEventType,
    data: serde_json::Value,
) -> NewWebhookEvent {
    NewWebhookEvent {
        event_type,
        data: data.to_string(),
        organization_id: org_id,
        user_id: Some(user_id),
        request_id: uuid::Uuid::new_v4().to_string(),
    }
}

async fn attempt_count(test_db: &TestDatabase) -> u64 {
    webhook_delivery_attempts::Entity::find()
        .count(test_db.connection())
        .await
        .unwrap()
}

async fn failure_event_count(test_db: &TestDatabase) -> u64 {
    webhook_events::Entity::find()
        .filter(
            webhook_events::Column::EventType
                .eq(WebhookEventType::WebhookDeliveryFailed.as_str()),
        )
        .count(test_db.connection())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_delivery_wire_format_and_signature() {
    let receiver = CapturingReceiver::start(vec![200]).await;
    let (test_db, service, org_id, user_id) = setup().await;

    let endpoint = service
        .create_endpoint(
            org_id,
            user_id,
            CreateWebhookRequest {
                name: "Wire format receiver".to_string(),
                url: receiver.url(),
                secret: None,
                events: vec![WebhookEventType::SurveyCreated],
                active: true,
                headers: Some(
                    [("x-team".to_string(), "platform".to_string())]
                        .into_iter()
                        .collect(),
                ),
                timeout_ms: Some(5000),
                retry_count: Some(0),
                retry_delay_ms: Some(100),
            },
        )
        .await
        .unwrap();

    let event = service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::SurveyCreated,
            serde_json::json!({"survey_id": 42, "survey_name": "AI Readiness Q3"}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .map(|count| count == 1)
                    .unwrap_or(false)
            }
        },
        10,
        50,
    )
    .await
    .unwrap();

    let requests = receiver.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(request.headers.get("user-agent").unwrap(), USER_AGENT);
    assert_eq!(
        request.headers.get("x-webhook-id").unwrap(),
        endpoint.id.to_string().as_str()
    );
    assert_eq!(request.headers.get("x-event-id").unwrap(), event.id.as_str());
    assert_eq!(request.headers.get("x-attempt").unwrap(), "1");
    assert_eq!(request.headers.get("x-team").unwrap(), "platform");

    let signature = request
        .headers
        .get("x-signature-sha256")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(verify_signature(&request.body, signature, &endpoint.secret));

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["id"], event.id.as_str());
    assert_eq!(body["event"], "survey.created");
    assert_eq!(body["request_id"], event.request_id.as_str());
    assert_eq!(
        body["data"],
        serde_json::json!({"survey_id": 42, "survey_name": "AI Readiness Q3"})
    );
    assert_eq!(
        body["timestamp"],
        request
            .headers
            .get("x-timestamp")
            .unwrap()
            .to_str()
            .unwrap()
    );

    let attempt = webhook_delivery_attempts::Entity::find()
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.webhook_id, endpoint.id);
    assert_eq!(attempt.event_id, event.id);
    assert_eq!(attempt.attempt_number, 1);
    assert_eq!(attempt.status_code, Some(200));
    assert_eq!(attempt.response_body, Some("received".to_string()));
    assert_eq!(attempt.error_message, None);
}

#[tokio::test]
async fn test_failed_delivery_retries_then_reports_failure() {
    let receiver = CapturingReceiver::start(vec![500]).await;
    let (test_db, service, org_id, user_id) = setup().await;

    let endpoint = create_endpoint(
        &service,
        org_id,
        user_id,
        &receiver.url(),
        vec![WebhookEventType::SurveyCreated],
        2,
        100,
    )
    .await;

    let started = Instant::now();
    let event = service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::SurveyCreated,
            serde_json::json!({"survey_id": 7}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                let attempts = webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .unwrap_or(0);
                let failures = webhook_events::Entity::find()
                    .filter(
                        webhook_events::Column::EventType
                            .eq(WebhookEventType::WebhookDeliveryFailed.as_str()),
                    )
                    .count(conn.as_ref())
                    .await
                    .unwrap_or(0);
                attempts == 3 && failures == 1
            }
        },
        10,
        50,
    )
    .await
    .unwrap();

    // Backoff between the three attempts: 100ms and 200ms
    assert!(started.elapsed() >= Duration::from_millis(300));

    let attempts = webhook_delivery_attempts::Entity::find()
        .order_by_asc(webhook_delivery_attempts::Column::AttemptNumber)
        .all(test_db.connection())
        .await
        .unwrap();
    assert_eq!(attempts.len(), 3);
    for (index, attempt) in attempts.iter().enumerate() {
        assert_eq!(attempt.attempt_number, index as i32 + 1);
        assert_eq!(attempt.status_code, Some(500));
        assert_eq!(attempt.event_id, event.id);
        assert_eq!(attempt.webhook_id, endpoint.id);
    }

    let captured_ordinals: Vec<String> = receiver
        .requests()
        .await
        .iter()
        .map(|request| {
            request
                .headers
                .get("x-attempt")
                .unwrap()
                .to_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(captured_ordinals, vec!["1", "2", "3"]);

    let failure_event = webhook_events::Entity::find()
        .filter(
            webhook_events::Column::EventType
                .eq(WebhookEventType::WebhookDeliveryFailed.as_str()),
        )
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure_event.organization_id, org_id);
    assert_eq!(failure_event.user_id, None);
    assert_eq!(failure_event.request_id, event.request_id);

    let payload: DeliveryFailedPayload = serde_json::from_str(&failure_event.payload).unwrap();
    assert_eq!(payload.event_id, event.id);
    assert_eq!(payload.event_type, "survey.created");
    assert_eq!(payload.webhook_id, endpoint.id);
    assert_eq!(payload.attempts, 3);
    assert_eq!(payload.last_error, "HTTP 500");
}

#[tokio::test]
async fn test_delivery_recovers_after_transient_failure() {
    let receiver = CapturingReceiver::start(vec![500, 200]).await;
    let (test_db, service, org_id, user_id) = setup().await;

    create_endpoint(
        &service,
        org_id,
        user_id,
        &receiver.url(),
        vec![WebhookEventType::ResponseSubmitted],
        3,
        100,
    )
    .await;

    service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::ResponseSubmitted,
            serde_json::json!({"response_id": 12, "survey_id": 7}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .map(|count| count == 2)
                    .unwrap_or(false)
            }
        },
        10,
        50,
    )
    .await
    .unwrap();

    // Success on the second attempt stops the remaining retries
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(attempt_count(&test_db).await, 2);
    assert_eq!(receiver.requests().await.len(), 2);
    assert_eq!(failure_event_count(&test_db).await, 0);

    let attempts = webhook_delivery_attempts::Entity::find()
        .order_by_asc(webhook_delivery_attempts::Column::AttemptNumber)
        .all(test_db.connection())
        .await
        .unwrap();
    assert_eq!(attempts[0].status_code, Some(500));
    assert_eq!(attempts[1].status_code, Some(200));
}

#[tokio::test]
async fn test_delivery_failure_events_do_not_cascade() {
    let receiver = CapturingReceiver::start(vec![500]).await;
    let (test_db, service, org_id, user_id) = setup().await;

    // Subscribes to its own failure notifications and always fails
    create_endpoint(
        &service,
        org_id,
        user_id,
        &receiver.url(),
        vec![
            WebhookEventType::SurveyCreated,
            WebhookEventType::WebhookDeliveryFailed,
        ],
        0,
        100,
    )
    .await;

    let event = service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::SurveyCreated,
            serde_json::json!({"survey_id": 3}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .map(|count| count == 2)
                    .unwrap_or(false)
            }
        },
        10,
        50,
    )
    .await
    .unwrap();

    // The failed delivery of the failure event must not produce another one
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(failure_event_count(&test_db).await, 1);
    assert_eq!(attempt_count(&test_db).await, 2);

    let failure_event = webhook_events::Entity::find()
        .filter(
            webhook_events::Column::EventType
                .eq(WebhookEventType::WebhookDeliveryFailed.as_str()),
        )
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    let payload: DeliveryFailedPayload = serde_json::from_str(&failure_event.payload).unwrap();
    assert_eq!(payload.event_id, event.id);
    assert_eq!(payload.attempts, 1);

    let attempted_events: Vec<String> = webhook_delivery_attempts::Entity::find()
        .all(test_db.connection())
        .await
        .unwrap()
        .into_iter()
        .map(|attempt| attempt.event_id)
        .collect();
    assert!(attempted_events.contains(&event.id));
    assert!(attempted_events.contains(&failure_event.id));
}

#[tokio::test]
async fn test_manual_test_delivery_is_not_persisted() {
    let receiver = CapturingReceiver::start(vec![200]).await;
    let (test_db, service, org_id, user_id) = setup().await;

    let endpoint = create_endpoint(
        &service,
        org_id,
        user_id,
        &receiver.url(),
        vec![WebhookEventType::SurveyCreated],
        2,
        100,
    )
    .await;

    let result = service.test_endpoint(org_id, endpoint.id).await.unwrap();
    assert!(result.success);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.response, Some("received".to_string()));
    assert_eq!(result.error, None);

    let requests = receiver.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "webhook.test");
    assert_eq!(body["data"]["webhook_id"], endpoint.id);
    let signature = request
        .headers
        .get("x-signature-sha256")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(verify_signature(&request.body, signature, &endpoint.secret));

    // Test deliveries leave no trace in events or attempts
    assert_eq!(
        webhook_events::Entity::find()
            .count(test_db.connection())
            .await
            .unwrap(),
        0
    );
    assert_eq!(attempt_count(&test_db).await, 0);
}

#[tokio::test]
async fn test_events_only_reach_subscribed_active_endpoints_in_org() {
    let subscribed = CapturingReceiver::start(vec![200]).await;
    let other_org = CapturingReceiver::start(vec![200]).await;
    let wrong_event = CapturingReceiver::start(vec![200]).await;
    let inactive = CapturingReceiver::start(vec![200]).await;

    let (test_db, service, org_id, user_id) = setup().await;
    let (other_org_id, other_user_id) = seed_org(&test_db, "Globex").await;

    let target = create_endpoint(
        &service,
        org_id,
        user_id,
        &subscribed.url(),
        vec![WebhookEventType::SurveyCreated],
        0,
        100,
    )
    .await;
    create_endpoint(
        &service,
        other_org_id,
        other_user_id,
        &other_org.url(),
        vec![WebhookEventType::SurveyCreated],
        0,
        100,
    )
    .await;
    create_endpoint(
        &service,
        org_id,
        user_id,
        &wrong_event.url(),
        vec![WebhookEventType::ReportGenerated],
        0,
        100,
    )
    .await;
    service
        .create_endpoint(
            org_id,
            user_id,
            CreateWebhookRequest {
                name: "Paused receiver".to_string(),
                url: inactive.url(),
                secret: None,
                events: vec![WebhookEventType::SurveyCreated],
                active: false,
                headers: None,
                timeout_ms: Some(5000),
                retry_count: Some(0),
                retry_delay_ms: Some(100),
            },
        )
        .await
        .unwrap();

    service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::SurveyCreated,
            serde_json::json!({"survey_id": 5}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .map(|count| count == 1)
                    .unwrap_or(false)
            }
        },
        10,
        50,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(subscribed.requests().await.len(), 1);
    assert_eq!(other_org.requests().await.len(), 0);
    assert_eq!(wrong_event.requests().await.len(), 0);
    assert_eq!(inactive.requests().await.len(), 0);

    let attempt = webhook_delivery_attempts::Entity::find()
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.webhook_id, target.id);
}

#[tokio::test]
async fn test_timed_out_delivery_records_error() {
    let receiver =
        CapturingReceiver::start_with_delay(vec![200], Some(Duration::from_secs(2))).await;
    let (test_db, service, org_id, user_id) = setup().await;

    service
        .create_endpoint(
            org_id,
            user_id,
            CreateWebhookRequest {
                name: "Slow receiver".to_string(),
                url: receiver.url(),
                secret: None,
                events: vec![WebhookEventType::SurveyCreated],
                active: true,
                headers: None,
                timeout_ms: Some(1000),
                retry_count: Some(0),
                retry_delay_ms: Some(100),
            },
        )
        .await
        .unwrap();

    service
        .trigger_event(new_event(
            org_id,
            user_id,
            WebhookEventType::SurveyCreated,
            serde_json::json!({"survey_id": 9}),
        ))
        .await
        .unwrap();

    let conn = test_db.connection_arc();
    wait_for(
        || {
            let conn = conn.clone();
            async move {
                webhook_delivery_attempts::Entity::find()
                    .count(conn.as_ref())
                    .await
                    .map(|count| count == 1)
                    .unwrap_or(false)
            }
        },
        15,
        100,
    )
    .await
    .unwrap();

    let attempt = webhook_delivery_attempts::Entity::find()
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status_code, None);
    assert!(attempt.error_message.is_some());
    assert!(attempt.duration_ms >= 900);

    let failure_event = webhook_events::Entity::find()
        .filter(
            webhook_events::Column::EventType
                .eq(WebhookEventType::WebhookDeliveryFailed.as_str()),
        )
        .one(test_db.connection())
        .await
        .unwrap()
        .unwrap();
    let payload: DeliveryFailedPayload = serde_json::from_str(&failure_event.payload).unwrap();
    assert!(!payload.last_error.starts_with("HTTP"));
}
