//! # plinth-registry
//!
//! The stateful heart of the extension subsystem:
//! - Persistent registry document and record store
//! - Dependency resolution against installed records
//! - The extension lifecycle state machine (install, enable, disable,
//!   quarantine, approve, remove)
//! - Capability-gated runtime contexts and the inter-extension bus
//! - Append-only lifecycle event ledger

pub mod context;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod plugin;
pub mod resolver;
pub mod store;

pub use context::{
    BusMessage, ExtensionBus, ExtensionContext, RouteDefinition, RouteRegistrar,
    ScopedQueryExecutor,
};
pub use events::{EventEnvelope, ExtensionEvent};
pub use ledger::{LedgerStatus, StatusLedger};
pub use lifecycle::{ExtensionRegistry, RemoveOptions};
pub use plugin::{ExtensionPlugin, PluginLoader};
pub use resolver::{
    DependencyConflict, DependencyResolver, Resolution, UnresolvedDependency, UnresolvedReason,
};
pub use store::{RecordStore, RegistryDocument, REGISTRY_SCHEMA_VERSION};
