use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aira_core::plugin::{AiraMiddleware, MiddlewareCondition, MiddlewarePriority};
use aira_core::RequestMetadata;
use axum::http::HeaderValue;
use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::debug;

use crate::apikey_service::ApiKeyService;
use crate::context::AuthContext;

/// Bearer-token authentication middleware.
///
/// Resolves `Authorization: Bearer ak_…` into an `AuthContext` request
/// extension. Requests without a valid key pass through unauthenticated;
/// guarded handlers reject them through the `RequireAuth` extractor.
pub struct AuthMiddleware {
    api_key_service: Arc<ApiKeyService>,
}

impl AuthMiddleware {
    pub fn new(api_key_service: Arc<ApiKeyService>) -> Self {
        Self { api_key_service }
    }

    async fn authenticate(&self, mut req: Request, next: Next) -> Response {
        let mut user = None;

        let auth_context = if let Some(auth_header) = req.headers().get("authorization") {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ");

                    if token.starts_with("ak_") {
                        match self.api_key_service.validate_api_key(token).await {
                            Ok((api_user, role, key_name, key_id)) => {
                                user = Some(api_user.clone());
                                Some(AuthContext::new_api_key(api_user, role, key_name, key_id))
                            }
                            Err(e) => {
                                debug!("API key validation failed: {}", e);
                                None
                            }
                        }
                    } else {
                        None
                    }
                } else {
                    None
                }
            } else {
                None
            }
        } else {
            None
        };

        // Resolve the correlation id before handlers run. An inbound
        // x-request-id wins; otherwise one is stamped onto the request so
        // every layer below sees the same id.
        let request_id = match req
            .headers()
            .get("x-request-id")
            .and_then(|h| h.to_str().ok())
        {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.headers_mut().insert("x-request-id", value);
                }
                id
            }
        };

        let metadata = RequestMetadata {
            request_id,
            ip_address: req
                .headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .unwrap_or("unknown")
                .to_string(),
            user_agent: req
                .headers()
                .get("user-agent")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
        };
        req.extensions_mut().insert(metadata);

        if let Some(user) = user {
            req.extensions_mut().insert(user);
        }
        if let Some(auth_ctx) = auth_context {
            req.extensions_mut().insert(auth_ctx);
        }

        next.run(req).await
    }
}

impl AiraMiddleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth_middleware"
    }

    fn plugin_name(&self) -> &'static str {
        "auth"
    }

    fn priority(&self) -> MiddlewarePriority {
        MiddlewarePriority::Security
    }

    fn condition(&self) -> MiddlewareCondition {
        MiddlewareCondition::Always
    }

    fn execute<'a>(
        &'a self,
        req: Request,
        next: Next,
    ) -> Pin<Box<dyn Future<Output = Result<Response, StatusCode>> + Send + 'a>> {
        Box::pin(async move { Ok(self.authenticate(req, next).await) })
    }
}
