use aira_core::error_builder::ErrorBuilder;
use aira_core::problemdetails::Problem;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::context::AuthContext;

/// Extractor that requires an authenticated caller.
///
/// Usage in handler:
/// ```ignore
/// pub async fn list_webhooks(
///     RequireAuth(auth): RequireAuth,
///     State(state): State<Arc<WebhookState>>,
/// ) -> Result<impl IntoResponse, Problem> {
///     permission_guard!(auth, WebhooksRead);
///
///     // Your handler logic here
/// }
/// ```
pub struct RequireAuth(pub AuthContext);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Problem;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| {
                ErrorBuilder::new(StatusCode::UNAUTHORIZED)
                    .type_("https://aira.dev/probs/authentication-required")
                    .title("Authentication Required")
                    .detail("This operation requires authentication")
                    .build()
            })?;

        Ok(RequireAuth(context))
    }
}
