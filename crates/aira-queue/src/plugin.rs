use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use aira_core::plugin::{AiraPlugin, PluginError, ServiceRegistrationContext};
use aira_core::{AppEvent, EventBus};
use tokio::sync::broadcast;
use tracing::info;

use crate::bus::BroadcastEventBus;

const DEFAULT_EVENT_CAPACITY: usize = 1000;

// The broadcast channel closes once every receiver is dropped. Holding one
// receiver for the process lifetime keeps the bus usable even when no
// listener has subscribed yet.
static KEEP_ALIVE_RECEIVER: Mutex<Option<broadcast::Receiver<AppEvent>>> = Mutex::new(None);

/// Plugin that provides the application event bus
pub struct EventBusPlugin {
    capacity: usize,
}

impl EventBusPlugin {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Default for EventBusPlugin {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl AiraPlugin for EventBusPlugin {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                "🚀 Initializing event bus with capacity {}",
                self.capacity
            );

            let (event_bus, keep_alive_receiver) =
                BroadcastEventBus::create_event_bus_arc_with_receiver(self.capacity);

            match KEEP_ALIVE_RECEIVER.lock() {
                Ok(mut guard) => *guard = Some(keep_alive_receiver),
                Err(_) => {
                    return Err(PluginError::InitializationFailed(
                        "Event bus keep-alive lock poisoned".to_string(),
                    ))
                }
            }

            context.register_service::<dyn EventBus>(event_bus);

            info!("✅ Event bus registered");
            Ok(())
        })
    }
}
