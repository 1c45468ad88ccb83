//! Execution context handed to loaded extension code
//!
//! Everything an extension touches at runtime flows through
//! [`ExtensionContext`]: queries go through the scoped executor, routes
//! through the registrar, and inter-extension traffic through the shared
//! [`ExtensionBus`]. The capability set built from the manifest's declared
//! permissions is checked before a gated resource is handed out; there is
//! no ambient access path around it.

use async_trait::async_trait;
use plinth_core::{CapabilitySet, Error, ResourceCategory, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Capacity of the inter-extension broadcast channel
const BUS_CHANNEL_CAPACITY: usize = 256;

/// One request handler registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// HTTP method
    pub method: String,

    /// Route path, relative to the extension's mount point
    pub path: String,

    /// Handler name inside the extension's backend unit
    pub handler: String,
}

/// Host-side registration of extension request handlers
pub trait RouteRegistrar: Send + Sync {
    /// Register a set of handlers on behalf of an extension
    fn register(&self, extension_id: &str, routes: &[RouteDefinition]) -> Result<()>;

    /// Remove every handler registered by an extension
    fn unregister(&self, extension_id: &str) -> Result<()>;
}

/// Runs queries against a per-extension logical schema
#[async_trait]
pub trait ScopedQueryExecutor: Send + Sync {
    /// Execute a query scoped to the extension, returning rows as JSON
    async fn execute(&self, extension_id: &str, query: &str) -> Result<Vec<Value>>;
}

/// A message published on the inter-extension event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Publishing extension id
    pub source: String,

    /// Topic name
    pub topic: String,

    /// Arbitrary JSON payload
    pub payload: Value,
}

/// Inter-extension communication: event bus, service registry, shared data
pub struct ExtensionBus {
    events: broadcast::Sender<BusMessage>,
    services: RwLock<HashMap<String, String>>,
    shared: RwLock<HashMap<String, Value>>,
}

impl ExtensionBus {
    /// Create an empty bus
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(BUS_CHANNEL_CAPACITY);
        Self {
            events,
            services: RwLock::new(HashMap::new()),
            shared: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a message; delivery to zero subscribers is not an error
    pub fn publish(&self, source: &str, topic: &str, payload: Value) {
        let message = BusMessage {
            source: source.to_string(),
            topic: topic.to_string(),
            payload,
        };
        let _ = self.events.send(message);
    }

    /// Subscribe to all bus messages
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.events.subscribe()
    }

    /// Advertise a named service provided by an extension
    pub async fn register_service(&self, name: &str, extension_id: &str) {
        let mut services = self.services.write().await;
        if let Some(previous) = services.insert(name.to_string(), extension_id.to_string()) {
            if previous != extension_id {
                warn!(
                    "Service {} re-registered by {} (was {})",
                    name, extension_id, previous
                );
            }
        }
    }

    /// Find the extension providing a named service
    pub async fn lookup_service(&self, name: &str) -> Option<String> {
        self.services.read().await.get(name).cloned()
    }

    /// Drop every service advertised by an extension
    pub async fn unregister_services(&self, extension_id: &str) {
        let mut services = self.services.write().await;
        services.retain(|_, provider| provider != extension_id);
    }

    /// Store a value in the shared data map under the owner's namespace
    pub async fn put_shared(&self, owner: &str, key: &str, value: Value) {
        let mut shared = self.shared.write().await;
        shared.insert(format!("{}:{}", owner, key), value);
    }

    /// Read a value from another extension's namespace
    pub async fn get_shared(&self, owner: &str, key: &str) -> Option<Value> {
        self.shared.read().await.get(&format!("{}:{}", owner, key)).cloned()
    }

    /// Remove all shared data owned by an extension, returning the count
    pub async fn purge_shared(&self, owner: &str) -> usize {
        let prefix = format!("{}:", owner);
        let mut shared = self.shared.write().await;
        let before = shared.len();
        shared.retain(|key, _| !key.starts_with(&prefix));
        before - shared.len()
    }
}

impl Default for ExtensionBus {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime context bound to one enabled extension
pub struct ExtensionContext {
    extension_id: String,
    capabilities: CapabilitySet,
    queries: Arc<dyn ScopedQueryExecutor>,
    routes: Arc<dyn RouteRegistrar>,
    bus: Arc<ExtensionBus>,
}

impl ExtensionContext {
    /// Bind a context for an extension about to be initialized
    pub fn new(
        extension_id: &str,
        capabilities: CapabilitySet,
        queries: Arc<dyn ScopedQueryExecutor>,
        routes: Arc<dyn RouteRegistrar>,
        bus: Arc<ExtensionBus>,
    ) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            capabilities,
            queries,
            routes,
            bus,
        }
    }

    /// Id of the extension this context belongs to
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// The capability set derived from declared permissions
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Whether extension code may import a module path
    pub fn allows_import(&self, module: &str) -> bool {
        self.capabilities.allows_import(module)
    }

    fn require(&self, category: ResourceCategory) -> Result<()> {
        if self.capabilities.allows(category) {
            Ok(())
        } else {
            Err(Error::capability_denied(
                &self.extension_id,
                category.to_string(),
            ))
        }
    }

    /// Run a query against the extension's logical schema.
    ///
    /// Requires the `storage_access` grant.
    pub async fn execute_query(&self, query: &str) -> Result<Vec<Value>> {
        self.require(ResourceCategory::Storage)?;
        debug!("Extension {} executing scoped query", self.extension_id);
        self.queries.execute(&self.extension_id, query).await
    }

    /// Register request handlers for this extension
    pub fn register_routes(&self, routes: &[RouteDefinition]) -> Result<()> {
        self.routes.register(&self.extension_id, routes)
    }

    /// Publish a message on the inter-extension bus.
    ///
    /// Requires the `events_access` grant.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        self.require(ResourceCategory::Events)?;
        self.bus.publish(&self.extension_id, topic, payload);
        Ok(())
    }

    /// Subscribe to the inter-extension bus.
    ///
    /// Requires the `events_access` grant.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<BusMessage>> {
        self.require(ResourceCategory::Events)?;
        Ok(self.bus.subscribe())
    }

    /// Advertise a named service provided by this extension
    pub async fn register_service(&self, name: &str) {
        self.bus.register_service(name, &self.extension_id).await;
    }

    /// Find the extension providing a named service
    pub async fn lookup_service(&self, name: &str) -> Option<String> {
        self.bus.lookup_service(name).await
    }

    /// Store a value in this extension's shared namespace
    pub async fn put_shared(&self, key: &str, value: Value) {
        self.bus.put_shared(&self.extension_id, key, value).await;
    }

    /// Read a value from another extension's shared namespace
    pub async fn get_shared(&self, owner: &str, key: &str) -> Option<Value> {
        self.bus.get_shared(owner, key).await
    }
}
