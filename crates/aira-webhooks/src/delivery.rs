//! Single webhook delivery attempts.
//!
//! One [`DeliveryClient::attempt`] call maps to exactly one physical HTTP
//! request. Retry policy, persistence and failure events live in the service
//! layer; this module only builds the signed request and reports what
//! happened.

use std::time::{Duration, Instant};

use chrono::SecondsFormat;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::debug;

use aira_entities::{webhook_endpoints, webhook_events};

use crate::signature::sign_payload;

/// `User-Agent` sent with every delivery.
pub const USER_AGENT: &str = "Aira-Webhooks/1.0";

/// Response bodies are truncated to this many characters before storage.
pub const MAX_RESPONSE_BODY_CHARS: usize = 1000;

/// Outcome of one physical delivery attempt.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The HTTP exchange completed, with any status code
    Completed {
        status: u16,
        /// Response body, truncated to [`MAX_RESPONSE_BODY_CHARS`]
        body: String,
        duration: Duration,
    },
    /// The request never completed (connect error, timeout, DNS failure)
    Failed { error: String, duration: Duration },
}

impl AttemptOutcome {
    /// A delivery attempt succeeded when the receiver answered with 2xx.
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Completed { status, .. } if (200..300).contains(status))
    }

    pub fn duration(&self) -> Duration {
        match self {
            AttemptOutcome::Completed { duration, .. }
            | AttemptOutcome::Failed { duration, .. } => *duration,
        }
    }

    /// Short description of a non-success outcome, used in logs and in
    /// `webhook.delivery_failed` payloads.
    pub fn describe_failure(&self) -> String {
        match self {
            AttemptOutcome::Completed { status, .. } => format!("HTTP {}", status),
            AttemptOutcome::Failed { error, .. } => error.clone(),
        }
    }
}

/// Delivery body. Field order here is the wire key order.
#[derive(Serialize)]
struct DeliveryBody<'a> {
    id: &'a str,
    event: &'a str,
    data: &'a RawValue,
    timestamp: &'a str,
    request_id: &'a str,
}

/// Sends individual webhook deliveries.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct DeliveryClient {
    http_client: reqwest::Client,
}

impl DeliveryClient {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client }
    }

    /// Performs one delivery attempt against an endpoint.
    ///
    /// The signature in `X-Signature-SHA256` is computed over the exact body
    /// bytes that go on the wire. The endpoint's `timeout_ms` bounds the whole
    /// exchange. Nothing is persisted here.
    pub async fn attempt(
        &self,
        event: &webhook_events::Model,
        endpoint: &webhook_endpoints::Model,
        attempt_number: i32,
    ) -> AttemptOutcome {
        let started = Instant::now();

        let timestamp = event
            .created_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let body = match build_delivery_body(event, &timestamp) {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::Failed {
                    error: format!("Failed to serialize delivery body: {}", e),
                    duration: started.elapsed(),
                }
            }
        };

        let signature = sign_payload(body.as_bytes(), &endpoint.secret);
        let headers = build_headers(endpoint, event, &signature, attempt_number, &timestamp);

        let result = self
            .http_client
            .post(&endpoint.url)
            .timeout(Duration::from_millis(endpoint.timeout_ms as u64))
            .headers(headers)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();

                AttemptOutcome::Completed {
                    status,
                    body: truncate_body(body),
                    duration: started.elapsed(),
                }
            }
            Err(e) => AttemptOutcome::Failed {
                error: e.to_string(),
                duration: started.elapsed(),
            },
        }
    }
}

impl Default for DeliveryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes the delivery body with the stored payload embedded verbatim.
///
/// Going through [`RawValue`] keeps the producer's JSON text untouched, so
/// receivers can verify the signature against the `data` bytes they see.
fn build_delivery_body(
    event: &webhook_events::Model,
    timestamp: &str,
) -> Result<String, serde_json::Error> {
    let data: &RawValue = serde_json::from_str(&event.payload)?;

    serde_json::to_string(&DeliveryBody {
        id: &event.id,
        event: &event.event_type,
        data,
        timestamp,
        request_id: &event.request_id,
    })
}

/// Builds the request headers: endpoint custom headers first, then the fixed
/// delivery set, which wins on any name collision.
fn build_headers(
    endpoint: &webhook_endpoints::Model,
    event: &webhook_events::Model,
    signature: &str,
    attempt_number: i32,
    timestamp: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(raw) = &endpoint.headers {
        if let Ok(custom) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw)
        {
            for (key, value) in custom {
                let value = match value.as_str() {
                    Some(value) => value,
                    None => {
                        debug!("Skipping non-string custom header '{}'", key);
                        continue;
                    }
                };

                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => debug!("Skipping invalid custom header '{}'", key),
                }
            }
        }
    }

    let fixed = [
        ("content-type", "application/json".to_string()),
        ("user-agent", USER_AGENT.to_string()),
        ("x-webhook-id", endpoint.id.to_string()),
        ("x-event-id", event.id.clone()),
        ("x-signature-sha256", signature.to_string()),
        ("x-attempt", attempt_number.to_string()),
        ("x-timestamp", timestamp.to_string()),
    ];

    for (name, value) in fixed {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }

    headers
}

fn truncate_body(body: String) -> String {
    if body.chars().count() <= MAX_RESPONSE_BODY_CHARS {
        body
    } else {
        body.chars().take(MAX_RESPONSE_BODY_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::verify_signature;

    fn test_event(payload: &str) -> webhook_events::Model {
        webhook_events::Model {
            id: "evt-00000000-0000-0000-0000-000000000001".to_string(),
            event_type: "survey.created".to_string(),
            payload: payload.to_string(),
            organization_id: 1,
            user_id: Some(1),
            request_id: "req-1".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    fn test_endpoint(headers: Option<&str>) -> webhook_endpoints::Model {
        webhook_endpoints::Model {
            id: 7,
            organization_id: 1,
            user_id: 1,
            name: "test endpoint".to_string(),
            url: "https://example.com/hooks".to_string(),
            secret: "whsec_test".to_string(),
            events: r#"["survey.created"]"#.to_string(),
            active: true,
            headers: headers.map(|h| h.to_string()),
            timeout_ms: 30000,
            retry_count: 3,
            retry_delay_ms: 1000,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_body_key_order_and_verbatim_data() {
        let event = test_event(r#"{"z":1,"a":2}"#);
        let body = build_delivery_body(&event, "2026-01-15T10:00:00.000000Z").unwrap();

        assert_eq!(
            body,
            format!(
                "{{\"id\":\"{}\",\"event\":\"survey.created\",\"data\":{{\"z\":1,\"a\":2}},\"timestamp\":\"2026-01-15T10:00:00.000000Z\",\"request_id\":\"req-1\"}}",
                event.id
            )
        );
    }

    #[test]
    fn test_body_rejects_malformed_payload() {
        let event = test_event("not json");
        assert!(build_delivery_body(&event, "2026-01-15T10:00:00Z").is_err());
    }

    #[test]
    fn test_fixed_headers_override_custom() {
        let event = test_event("{}");
        let endpoint = test_endpoint(Some(
            r#"{"X-Webhook-ID":"spoofed","X-Custom":"kept","Content-Type":"text/plain"}"#,
        ));

        let headers = build_headers(&endpoint, &event, "deadbeef", 2, "2026-01-15T10:00:00Z");

        assert_eq!(headers.get("x-webhook-id").unwrap(), "7");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        assert_eq!(headers.get("user-agent").unwrap(), USER_AGENT);
        assert_eq!(headers.get("x-event-id").unwrap(), event.id.as_str());
        assert_eq!(headers.get("x-signature-sha256").unwrap(), "deadbeef");
        assert_eq!(headers.get("x-attempt").unwrap(), "2");
        assert_eq!(headers.get("x-timestamp").unwrap(), "2026-01-15T10:00:00Z");
    }

    #[test]
    fn test_invalid_custom_headers_are_skipped() {
        let event = test_event("{}");
        let endpoint = test_endpoint(Some(r#"{"bad header!":"v","X-Num":7,"X-Ok":"yes"}"#));

        let headers = build_headers(&endpoint, &event, "sig", 1, "2026-01-15T10:00:00Z");

        assert!(headers.get("x-num").is_none());
        assert_eq!(headers.get("x-ok").unwrap(), "yes");
    }

    #[test]
    fn test_malformed_headers_column_is_ignored() {
        let event = test_event("{}");
        let endpoint = test_endpoint(Some("not json"));

        let headers = build_headers(&endpoint, &event, "sig", 1, "2026-01-15T10:00:00Z");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_signature_matches_body_bytes() {
        let event = test_event(r#"{"survey_id":42}"#);
        let endpoint = test_endpoint(None);

        let timestamp = "2026-01-15T10:00:00.000000Z";
        let body = build_delivery_body(&event, timestamp).unwrap();
        let signature = sign_payload(body.as_bytes(), &endpoint.secret);

        assert!(verify_signature(body.as_bytes(), &signature, &endpoint.secret));
        assert!(!verify_signature(body.as_bytes(), &signature, "whsec_other"));
    }

    #[test]
    fn test_truncate_body_limits_chars() {
        let long = "x".repeat(MAX_RESPONSE_BODY_CHARS + 500);
        assert_eq!(truncate_body(long).chars().count(), MAX_RESPONSE_BODY_CHARS);

        let short = "short".to_string();
        assert_eq!(truncate_body(short), "short");
    }

    #[test]
    fn test_truncate_body_is_char_safe() {
        let multibyte = "日".repeat(MAX_RESPONSE_BODY_CHARS + 1);
        let truncated = truncate_body(multibyte);
        assert_eq!(truncated.chars().count(), MAX_RESPONSE_BODY_CHARS);
    }

    #[test]
    fn test_outcome_success_bounds() {
        let completed = |status: u16| AttemptOutcome::Completed {
            status,
            body: String::new(),
            duration: Duration::from_millis(5),
        };

        assert!(completed(200).is_success());
        assert!(completed(204).is_success());
        assert!(completed(299).is_success());
        assert!(!completed(199).is_success());
        assert!(!completed(300).is_success());
        assert!(!completed(500).is_success());

        let failed = AttemptOutcome::Failed {
            error: "connection refused".to_string(),
            duration: Duration::from_millis(5),
        };
        assert!(!failed.is_success());
        assert_eq!(failed.describe_failure(), "connection refused");
        assert_eq!(completed(503).describe_failure(), "HTTP 503");
    }
}
