//! Auth plugin for the Aira plugin system
//!
//! Provides the ApiKeyService and installs the bearer-token middleware
//! ahead of every route.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aira_core::plugin::{
    AiraPlugin, PluginContext, PluginError, PluginMiddlewareCollection,
    ServiceRegistrationContext,
};

use crate::apikey_service::ApiKeyService;
use crate::middleware::AuthMiddleware;

pub struct AuthPlugin;

impl AuthPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AuthPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AiraPlugin for AuthPlugin {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let db = context.require_service::<sea_orm::DatabaseConnection>();

            let api_key_service = Arc::new(ApiKeyService::new(db));
            context.register_service(api_key_service);

            tracing::debug!("Auth plugin services registered successfully");
            Ok(())
        })
    }

    fn configure_middleware(&self, context: &PluginContext) -> Option<PluginMiddlewareCollection> {
        let mut middleware_collection = PluginMiddlewareCollection::new();

        let api_key_service = context.require_service::<ApiKeyService>();
        let auth_middleware = AuthMiddleware::new(api_key_service);

        middleware_collection.add_aira_middleware(Arc::new(auth_middleware));

        Some(middleware_collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auth_plugin_name() {
        let auth_plugin = AuthPlugin::new();
        assert_eq!(auth_plugin.name(), "auth");
    }
}
