//! Serve command: run the Aira HTTP API server
//!
//! Wires the plugin manager together, mounts Swagger UI and serves the
//! application until Ctrl+C.

use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use utoipa_swagger_ui::SwaggerUi;

use aira_auth::AuthPlugin;
use aira_core::plugin::PluginManager;
use aira_core::ServerConfig;
use aira_queue::EventBusPlugin;
use aira_webhooks::{WebhookEventListener, WebhooksPlugin};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, env = "AIRA_ADDRESS")]
    pub address: Option<String>,

    /// Database connection URL
    #[arg(long, env = "AIRA_DATABASE_URL")]
    pub database_url: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let mut config = ServerConfig::from_env()?;
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(database_url) = self.database_url {
            config.database_url = database_url;
        }

        debug!("Initializing database connection...");
        let db = aira_database::establish_connection(&config.database_url).await?;

        info!("Starting Aira server on {}", config.address);

        let mut plugin_manager = PluginManager::new();

        // Register core services that plugins can access
        let service_context = plugin_manager.service_context();
        service_context.register_service(db.clone());

        // Register plugins in dependency order:
        // 1. EventBusPlugin - provides the application event bus
        debug!("Registering EventBusPlugin");
        plugin_manager.register_plugin(Box::new(EventBusPlugin::with_default_capacity()));

        // 2. AuthPlugin - provides API key authentication and the auth middleware
        debug!("Registering AuthPlugin");
        plugin_manager.register_plugin(Box::new(AuthPlugin::new()));

        // 3. WebhooksPlugin - provides webhook management and deliveries
        debug!("Registering WebhooksPlugin");
        plugin_manager.register_plugin(Box::new(WebhooksPlugin::new()));

        debug!("Initializing plugins");
        if let Err(e) = plugin_manager.initialize_plugins().await {
            tracing::error!("❌ Plugin initialization FAILED");
            tracing::error!("Error: {}", e);
            return Err(anyhow::anyhow!("Plugin initialization failed: {}", e));
        }
        debug!("All plugins initialized successfully");

        // Build the application with all plugin routes and OpenAPI schemas
        debug!("Building application with plugin routes");
        let api_doc = plugin_manager
            .get_unified_openapi()
            .map_err(|e| anyhow::anyhow!("Failed to build unified OpenAPI schema: {}", e))?;
        let app = plugin_manager
            .build_application()
            .map_err(|e| anyhow::anyhow!("Failed to build application: {}", e))?
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc));

        let event_listener = plugin_manager
            .service_context()
            .get_service::<WebhookEventListener>();

        let listener = TcpListener::bind(&config.address).await?;
        info!("Aira API server listening on {}", config.address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(event_listener))
            .await?;

        info!("Aira API server exited");
        Ok(())
    }
}

async fn shutdown_signal(event_listener: Option<Arc<WebhookEventListener>>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c signal");
    info!("Received Ctrl+C, initiating graceful shutdown...");

    // Stop consuming bus events before the server drains its connections
    if let Some(event_listener) = event_listener {
        event_listener.stop().await;
    }
}
