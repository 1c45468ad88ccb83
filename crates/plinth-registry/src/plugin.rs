//! Plugin seam between the registry and the host's loading mechanism
//!
//! The registry never touches a loading mechanism directly. Hosts supply a
//! [`PluginLoader`] that resolves a validated record's backend entry to a
//! loaded unit; that unit may be backed by an embedded interpreter, a
//! shared library, or an out-of-process worker.

use crate::context::ExtensionContext;
use async_trait::async_trait;
use plinth_core::types::ExtensionRecord;
use plinth_core::Result;

/// A loaded backend unit of one extension
#[async_trait]
pub trait ExtensionPlugin: Send + Sync {
    /// Called when the extension is enabled. Registering routes and
    /// services happens here, through the context.
    async fn initialize(&self, context: &ExtensionContext) -> Result<()>;

    /// Called when the extension is disabled. Failures are logged by the
    /// registry but never block the transition.
    async fn cleanup(&self, context: &ExtensionContext) -> Result<()>;

    /// Called once after an update swap, before the new version is
    /// enabled. The default migration does nothing.
    async fn migrate(&self, _context: &ExtensionContext, _from_version: &str) -> Result<()> {
        Ok(())
    }
}

/// Resolves a record's backend entry to a loaded plugin unit
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Load the backend unit for an installed record
    async fn load(&self, record: &ExtensionRecord) -> Result<Box<dyn ExtensionPlugin>>;
}
