use std::collections::BTreeMap;

use serde_json::Value;

use axum::http::StatusCode;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Json};
use serde::Serialize;

use utoipa::ToSchema;

/// Representation of a Problem error to return to the client.
/// Follows RFC 7807 - Problem Details for HTTP APIs
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "type": "https://aira.dev/probs/not-found",
    "title": "Resource Not Found",
    "detail": "Webhook endpoint 42 was not found",
    "instance": "/api/webhooks/42"
}))]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    #[schema(example = "https://aira.dev/probs/not-found")]
    pub type_url: Option<String>,
    /// A short, human-readable summary of the problem type
    #[schema(example = "Resource Not Found")]
    pub title: String,
    /// A human-readable explanation specific to this occurrence of the problem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence of the problem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Additional properties of the problem
    #[schema(additional_properties = true)]
    pub extensions: BTreeMap<String, Value>,
}

/// Problem error as carried by handlers before serialization.
#[derive(Debug, Clone)]
pub struct Problem {
    /// The status code of the problem.
    pub status_code: StatusCode,
    /// The actual body of the problem.
    pub body: BTreeMap<String, Value>,
}

/// Create a new `Problem` response to send to the client.
pub fn new<S>(status_code: S) -> Problem
where
    S: Into<StatusCode>,
{
    Problem {
        status_code: status_code.into(),
        body: BTreeMap::new(),
    }
}

impl Problem {
    /// Specify the "type" to use for the problem.
    pub fn with_type<S>(self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.with_value("type", value.into())
    }

    /// Specify the "title" to use for the problem.
    pub fn with_title<S>(self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.with_value("title", value.into())
    }

    /// Specify the "detail" to use for the problem.
    pub fn with_detail<S>(self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.with_value("detail", value.into())
    }

    /// Specify the "instance" to use for the problem.
    pub fn with_instance<S>(self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.with_value("instance", value.into())
    }

    /// Specify an arbitrary value to include in the problem.
    pub fn with_value<V>(mut self, key: &str, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.body.insert(key.to_owned(), value.into());

        self
    }
}

/// Result type where the error is always a `Problem`.
pub type Result<T> = std::result::Result<T, Problem>;

impl IntoResponse for Problem {
    fn into_response(self) -> axum::response::Response {
        if self.body.is_empty() {
            self.status_code.into_response()
        } else {
            let body = Json(self.body);
            let mut response = (self.status_code, body).into_response();

            if let Ok(content_type) = "application/problem+json".parse() {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_builds_body() {
        let problem = new(StatusCode::NOT_FOUND)
            .with_title("Resource Not Found")
            .with_detail("nothing here")
            .with_value("resource_id", 42);

        assert_eq!(problem.status_code, StatusCode::NOT_FOUND);
        assert_eq!(problem.body["title"], "Resource Not Found");
        assert_eq!(problem.body["resource_id"], 42);
    }

    #[test]
    fn test_problem_response_content_type() {
        let response = new(StatusCode::BAD_REQUEST)
            .with_title("Bad Request")
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
