/// Guard function that checks permission and returns early if not authorized
///
/// Usage in handler:
/// ```ignore
/// pub async fn create_webhook(
///     RequireAuth(auth): RequireAuth,
///     State(state): State<Arc<WebhookState>>,
///     Json(request): Json<CreateWebhookRequest>,
/// ) -> Result<impl IntoResponse, Problem> {
///     permission_guard!(auth, WebhooksWrite);
///
///     // Your handler logic here
/// }
/// ```
#[macro_export]
macro_rules! permission_guard {
    ($auth:expr, $permission:ident) => {
        if !$auth.has_permission(&$crate::permissions::Permission::$permission) {
            return Err(aira_core::error_builder::ErrorBuilder::new(
                ::axum::http::StatusCode::FORBIDDEN,
            )
            .type_("https://aira.dev/probs/insufficient-permissions")
            .title("Insufficient Permissions")
            .detail(format!(
                "This operation requires the {} permission",
                $crate::permissions::Permission::$permission.to_string()
            ))
            .value(
                "required_permission",
                $crate::permissions::Permission::$permission.to_string(),
            )
            .value("user_role", $auth.role.to_string())
            .build());
        }
    };
}
