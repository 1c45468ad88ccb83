//! Extension lifecycle state machine
//!
//! Owns the per-extension state machine
//! `validated -> inactive -> active <-> error`, with
//! `inactive|active -> quarantined` (manual approve returns to inactive)
//! and any non-active state -> removed. All operations serialize through
//! one `tokio::sync::Mutex`, so concurrent calls for the same id need no
//! caller-side coordination. Every transition lands one envelope in the
//! status ledger.

use crate::context::{ExtensionBus, ExtensionContext, RouteRegistrar, ScopedQueryExecutor};
use crate::events::{EventEnvelope, ExtensionEvent};
use crate::ledger::StatusLedger;
use crate::plugin::{ExtensionPlugin, PluginLoader};
use crate::resolver::DependencyResolver;
use crate::store::RecordStore;
use plinth_core::types::{ExtensionRecord, ExtensionStatus, SecurityStatus};
use plinth_core::{build_capabilities, Error, HostPaths, Result};
use plinth_package::{
    compute_integrity_hash, copy_dir, move_dir, ExtensionPackage, PackageValidator,
    QuarantineStore, SecurityScanner,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What `remove` deletes beyond the registry record
#[derive(Debug, Clone, Copy)]
pub struct RemoveOptions {
    /// Purge the extension's shared data entries
    pub purge_data: bool,

    /// Delete the extension's installed files
    pub purge_files: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            purge_data: true,
            purge_files: true,
        }
    }
}

/// A plugin unit kept loaded while its extension is active
struct LoadedExtension {
    plugin: Box<dyn ExtensionPlugin>,
    context: ExtensionContext,
}

struct RegistryInner {
    paths: HostPaths,
    store: RecordStore,
    ledger: StatusLedger,
    validator: PackageValidator,
    scanner: SecurityScanner,
    resolver: DependencyResolver,
    quarantine: QuarantineStore,
    loader: Arc<dyn PluginLoader>,
    routes: Arc<dyn RouteRegistrar>,
    queries: Arc<dyn ScopedQueryExecutor>,
    bus: Arc<ExtensionBus>,
    loaded: HashMap<String, LoadedExtension>,
}

/// The extension registry and lifecycle manager
pub struct ExtensionRegistry {
    inner: Mutex<RegistryInner>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry").finish_non_exhaustive()
    }
}

impl ExtensionRegistry {
    /// Open (or initialize) the registry under the given host paths
    pub fn new(
        paths: HostPaths,
        loader: Arc<dyn PluginLoader>,
        routes: Arc<dyn RouteRegistrar>,
        queries: Arc<dyn ScopedQueryExecutor>,
    ) -> Result<Self> {
        paths.ensure_layout()?;
        let store = RecordStore::new(paths.registry_file())?;
        let ledger = StatusLedger::new(paths.ledger_file());
        let quarantine = QuarantineStore::new(paths.quarantine_dir());
        let validator = PackageValidator::new()?;

        Ok(Self {
            inner: Mutex::new(RegistryInner {
                paths,
                store,
                ledger,
                validator,
                scanner: SecurityScanner::new(),
                resolver: DependencyResolver::new(),
                quarantine,
                loader,
                routes,
                queries,
                bus: Arc::new(ExtensionBus::new()),
                loaded: HashMap::new(),
            }),
        })
    }

    /// The shared inter-extension bus
    pub async fn bus(&self) -> Arc<ExtensionBus> {
        self.inner.lock().await.bus.clone()
    }

    /// A record snapshot by id
    pub async fn get(&self, id: &str) -> Option<ExtensionRecord> {
        self.inner.lock().await.store.get(id).cloned()
    }

    /// Snapshots of all records, in id order
    pub async fn list(&self) -> Vec<ExtensionRecord> {
        self.inner
            .lock()
            .await
            .store
            .list()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Validate, screen, resolve, and register an uploaded package.
    ///
    /// A critical scan finding quarantines the package: its files land in
    /// the quarantine tree and a `quarantined` record is created so the
    /// upload can later be approved or removed. Validation and dependency
    /// failures reject without creating a record or leaving files behind.
    pub async fn install(&self, archive_bytes: &[u8], owner: &str) -> Result<ExtensionRecord> {
        let mut inner = self.inner.lock().await;
        install_package(&mut inner, archive_bytes, owner)
    }

    /// Load and initialize an installed extension.
    ///
    /// On failure the record is kept, moved to `error`, and the message
    /// stored; enabling again after fixing the cause is allowed.
    pub async fn enable(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        enable_extension(&mut inner, id).await
    }

    /// Tear down a running extension and mark it inactive.
    ///
    /// Cleanup failures are logged, never surfaced: disable always
    /// succeeds for an existing extension.
    pub async fn disable(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        disable_extension(&mut inner, id).await
    }

    /// Delete a disabled extension's record and, per options, its files
    /// and shared data.
    pub async fn remove(&self, id: &str, options: RemoveOptions) -> Result<()> {
        let mut inner = self.inner.lock().await;
        remove_extension(&mut inner, id, options).await
    }

    /// Manually release a quarantined extension back to `inactive`,
    /// restoring its files to the install root when present.
    pub async fn approve(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        approve_extension(&mut inner, id)
    }

    /// Manually quarantine an installed extension, disabling it first
    /// when active and relocating its files.
    pub async fn quarantine(&self, id: &str, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        quarantine_extension(&mut inner, id, reason).await
    }

    /// Recompute the content hash of an extension's installed files and
    /// compare it against the hash recorded at install time.
    pub async fn verify_integrity(&self, id: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        let record = inner
            .store
            .get(id)
            .ok_or_else(|| Error::extension_not_found(id))?;

        if !plinth_package::verify_integrity(&record.file_path, &record.integrity_hash)? {
            let actual = compute_integrity_hash(&record.file_path)?;
            return Err(Error::IntegrityMismatch {
                id: id.to_string(),
                expected: record.integrity_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Run the migration hook of a freshly swapped version.
    ///
    /// The plugin is loaded, migrated, and dropped again; a later enable
    /// performs its own load.
    pub async fn migrate_version(&self, id: &str, from_version: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        let record = inner
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| Error::extension_not_found(id))?;

        let capabilities = build_capabilities(&record.manifest.permissions)?;
        let context = ExtensionContext::new(
            id,
            capabilities,
            inner.queries.clone(),
            inner.routes.clone(),
            inner.bus.clone(),
        );
        let loader = inner.loader.clone();

        let plugin = loader.load(&record).await?;
        plugin.migrate(&context, from_version).await
    }

    /// Replace a disabled extension's files and record with a new
    /// version. Emits no ledger events; the update orchestrator owns
    /// that trail.
    pub async fn swap_version(
        &self,
        id: &str,
        package: &ExtensionPackage,
    ) -> Result<ExtensionRecord> {
        let mut inner = self.inner.lock().await;
        swap_extension_version(&mut inner, id, package)
    }

    /// Put the prior version back after a failed update swap.
    ///
    /// Copies the backup over the install directory, removes the failed
    /// version's files and record, and reinstates the original record
    /// disabled. An error here means the extension could not be restored.
    pub async fn restore_version(
        &self,
        failed_id: &str,
        original: &ExtensionRecord,
        backup_dir: &Path,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        restore_extension_version(&mut inner, failed_id, original, backup_dir)
    }
}

fn install_package(
    inner: &mut RegistryInner,
    archive_bytes: &[u8],
    owner: &str,
) -> Result<ExtensionRecord> {
    let package = inner.validator.validate(archive_bytes)?;
    let manifest = package.manifest.clone();
    let id = package.id();

    if inner.store.contains(&id) {
        return Err(Error::duplicate_extension(&id));
    }

    inner.ledger.append(&EventEnvelope::new(
        &manifest.name,
        &manifest.version,
        None,
        Some(ExtensionStatus::Validated),
        ExtensionEvent::InstallStarted,
    ))?;

    // Stage next to the final location so the move is a rename
    let staging = tempfile::TempDir::new_in(inner.paths.data_root())?;
    let extracted = package.archive.extract_to(staging.path())?;
    debug!("Extracted {} files for {}", extracted, id);
    flatten_package_root(staging.path(), &manifest.name)?;

    let report = inner.scanner.scan(staging.path())?;
    let integrity_hash = compute_integrity_hash(staging.path())?;

    if report.has_critical() {
        let summary = report.summary();
        let jailed = inner
            .quarantine
            .quarantine(staging.path(), owner, &id, &summary)?;

        let mut record = ExtensionRecord::new(
            manifest.clone(),
            jailed,
            integrity_hash,
            SecurityStatus::Quarantined,
            owner,
        );
        record.status = ExtensionStatus::Quarantined;
        record.error_message = Some(summary.clone());
        inner.store.insert(record)?;
        inner.store.save()?;

        inner.ledger.append(&EventEnvelope::new(
            &manifest.name,
            &manifest.version,
            Some(ExtensionStatus::Validated),
            Some(ExtensionStatus::Quarantined),
            ExtensionEvent::Quarantined {
                reason: summary.clone(),
            },
        ))?;

        warn!("Quarantined {} on install: {}", id, summary);
        return Err(Error::security_rejection(summary));
    }

    let resolution = inner
        .resolver
        .resolve(&manifest.name, &manifest.dependencies, &inner.store)?;
    if !resolution.can_install {
        let error = Error::DependencyCheckFailed {
            unresolved: resolution.unresolved_lines(),
            conflicts: resolution.conflict_lines(),
        };
        inner.ledger.append(&EventEnvelope::new(
            &manifest.name,
            &manifest.version,
            Some(ExtensionStatus::Validated),
            None,
            ExtensionEvent::InstallFailed {
                error_message: error.to_string(),
            },
        ))?;
        return Err(error);
    }

    let dest = inner.paths.extension_dir(&id);
    if dest.exists() {
        warn!("Replacing stale extension directory: {:?}", dest);
        std::fs::remove_dir_all(&dest)?;
    }
    move_dir(staging.path(), &dest)?;

    let security_status = if report.is_clean() {
        SecurityStatus::Safe
    } else {
        SecurityStatus::Warning
    };
    let mut record = ExtensionRecord::new(
        manifest,
        dest,
        integrity_hash.clone(),
        security_status,
        owner,
    );
    record.status = ExtensionStatus::Inactive;
    inner.store.insert(record.clone())?;
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(ExtensionStatus::Validated),
        Some(ExtensionStatus::Inactive),
        ExtensionEvent::InstallCompleted { integrity_hash },
    ))?;

    info!(
        "Installed extension {} ({} scan warnings)",
        record.id,
        report.warnings.len()
    );
    Ok(record)
}

async fn enable_extension(inner: &mut RegistryInner, id: &str) -> Result<()> {
    let record = match inner.store.get(id) {
        Some(record) => record.clone(),
        None => return Err(Error::extension_not_found(id)),
    };

    match record.status {
        ExtensionStatus::Active => {
            debug!("Extension {} already active", id);
            return Ok(());
        }
        ExtensionStatus::Quarantined => {
            return Err(Error::invalid_transition(
                id,
                record.status.to_string(),
                "enable",
            ));
        }
        _ => {}
    }

    let state_before = record.status;
    let capabilities = build_capabilities(&record.manifest.permissions)?;
    let context = ExtensionContext::new(
        id,
        capabilities,
        inner.queries.clone(),
        inner.routes.clone(),
        inner.bus.clone(),
    );

    let loader = inner.loader.clone();
    let plugin = match loader.load(&record).await {
        Ok(plugin) => plugin,
        Err(e) => return fail_enable(inner, &record, state_before, e.to_string()),
    };

    if let Err(e) = plugin.initialize(&context).await {
        return fail_enable(inner, &record, state_before, e.to_string());
    }

    inner
        .loaded
        .insert(id.to_string(), LoadedExtension { plugin, context });

    if let Some(stored) = inner.store.get_mut(id) {
        stored.status = ExtensionStatus::Active;
        stored.is_enabled = true;
        stored.error_message = None;
        stored.touch();
    }
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(state_before),
        Some(ExtensionStatus::Active),
        ExtensionEvent::EnableSucceeded,
    ))?;

    info!("Enabled extension {}", id);
    Ok(())
}

fn fail_enable(
    inner: &mut RegistryInner,
    record: &ExtensionRecord,
    state_before: ExtensionStatus,
    message: String,
) -> Result<()> {
    if let Some(stored) = inner.store.get_mut(&record.id) {
        stored.status = ExtensionStatus::Error;
        stored.is_enabled = false;
        stored.error_message = Some(message.clone());
        stored.touch();
    }
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(state_before),
        Some(ExtensionStatus::Error),
        ExtensionEvent::EnableFailed {
            error_message: message.clone(),
        },
    ))?;

    warn!("Extension {} failed to initialize: {}", record.id, message);
    Err(Error::initialization_failed(&record.id, message))
}

async fn disable_extension(inner: &mut RegistryInner, id: &str) -> Result<()> {
    let record = match inner.store.get(id) {
        Some(record) => record.clone(),
        None => return Err(Error::extension_not_found(id)),
    };

    unload_extension(inner, id).await;

    match record.status {
        // Quarantine release goes through approve, not disable
        ExtensionStatus::Quarantined => return Ok(()),
        ExtensionStatus::Inactive if !record.is_enabled => {
            debug!("Extension {} already inactive", id);
            return Ok(());
        }
        _ => {}
    }

    if let Some(stored) = inner.store.get_mut(id) {
        stored.status = ExtensionStatus::Inactive;
        stored.is_enabled = false;
        stored.touch();
    }
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(record.status),
        Some(ExtensionStatus::Inactive),
        ExtensionEvent::Disabled,
    ))?;

    info!("Disabled extension {}", id);
    Ok(())
}

/// Tear down the loaded unit and its registrations; never fails
async fn unload_extension(inner: &mut RegistryInner, id: &str) {
    if let Some(loaded) = inner.loaded.remove(id) {
        if let Err(e) = loaded.plugin.cleanup(&loaded.context).await {
            warn!("Cleanup failed for {}: {}", id, e);
        }
    }
    if let Err(e) = inner.routes.unregister(id) {
        warn!("Route unregistration failed for {}: {}", id, e);
    }
    inner.bus.unregister_services(id).await;
}

async fn remove_extension(
    inner: &mut RegistryInner,
    id: &str,
    options: RemoveOptions,
) -> Result<()> {
    let record = match inner.store.get(id) {
        Some(record) => record.clone(),
        None => return Err(Error::extension_not_found(id)),
    };

    if record.status == ExtensionStatus::Active || record.is_enabled {
        return Err(Error::invalid_transition(
            id,
            record.status.to_string(),
            "remove",
        ));
    }

    if options.purge_files {
        if record.file_path.exists() {
            std::fs::remove_dir_all(&record.file_path)?;
        } else {
            warn!("Extension files already absent: {:?}", record.file_path);
        }
    }

    if options.purge_data {
        let purged = inner.bus.purge_shared(id).await;
        if purged > 0 {
            debug!("Purged {} shared data entries for {}", purged, id);
        }
    }

    inner.store.remove(id);
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(record.status),
        None,
        ExtensionEvent::Removed,
    ))?;

    info!("Removed extension {}", id);
    Ok(())
}

fn approve_extension(inner: &mut RegistryInner, id: &str) -> Result<()> {
    let record = match inner.store.get(id) {
        Some(record) => record.clone(),
        None => return Err(Error::extension_not_found(id)),
    };

    if record.status != ExtensionStatus::Quarantined {
        return Err(Error::invalid_transition(
            id,
            record.status.to_string(),
            "approve",
        ));
    }

    let dest = inner.paths.extension_dir(id);
    if inner.quarantine.contains(&record.installed_by, id) {
        inner.quarantine.release(&record.installed_by, id, &dest)?;
    } else {
        warn!("No quarantined files found for {}; record-only approval", id);
    }

    if let Some(stored) = inner.store.get_mut(id) {
        stored.status = ExtensionStatus::Inactive;
        stored.security_status = SecurityStatus::Warning;
        stored.error_message = None;
        stored.file_path = dest;
        stored.touch();
    }
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(ExtensionStatus::Quarantined),
        Some(ExtensionStatus::Inactive),
        ExtensionEvent::Approved,
    ))?;

    info!("Approved quarantined extension {}", id);
    Ok(())
}

async fn quarantine_extension(inner: &mut RegistryInner, id: &str, reason: &str) -> Result<()> {
    let record = match inner.store.get(id) {
        Some(record) => record.clone(),
        None => return Err(Error::extension_not_found(id)),
    };

    if record.status == ExtensionStatus::Quarantined {
        debug!("Extension {} already quarantined", id);
        return Ok(());
    }

    // A running extension is torn down before its files move
    unload_extension(inner, id).await;

    let jailed = if record.file_path.exists() {
        Some(
            inner
                .quarantine
                .quarantine(&record.file_path, &record.installed_by, id, reason)?,
        )
    } else {
        warn!(
            "Extension files absent, quarantining record only: {:?}",
            record.file_path
        );
        None
    };

    if let Some(stored) = inner.store.get_mut(id) {
        stored.status = ExtensionStatus::Quarantined;
        stored.security_status = SecurityStatus::Quarantined;
        stored.is_enabled = false;
        stored.error_message = Some(reason.to_string());
        if let Some(path) = jailed {
            stored.file_path = path;
        }
        stored.touch();
    }
    inner.store.save()?;

    inner.ledger.append(&EventEnvelope::new(
        &record.name,
        &record.version,
        Some(record.status),
        Some(ExtensionStatus::Quarantined),
        ExtensionEvent::Quarantined {
            reason: reason.to_string(),
        },
    ))?;

    warn!("Quarantined extension {}: {}", id, reason);
    Ok(())
}

fn swap_extension_version(
    inner: &mut RegistryInner,
    id: &str,
    package: &ExtensionPackage,
) -> Result<ExtensionRecord> {
    let old = inner
        .store
        .get(id)
        .cloned()
        .ok_or_else(|| Error::extension_not_found(id))?;
    if old.is_enabled || inner.loaded.contains_key(id) {
        return Err(Error::invalid_transition(
            id,
            old.status.to_string(),
            "swap",
        ));
    }

    let new_id = package.id();
    if new_id != old.id && inner.store.contains(&new_id) {
        return Err(Error::duplicate_extension(&new_id));
    }

    let staging = tempfile::TempDir::new_in(inner.paths.data_root())?;
    package.archive.extract_to(staging.path())?;
    flatten_package_root(staging.path(), &package.manifest.name)?;

    let report = inner.scanner.scan(staging.path())?;
    if report.has_critical() {
        return Err(Error::security_rejection(report.summary()));
    }
    let integrity_hash = compute_integrity_hash(staging.path())?;

    let dest = inner.paths.extension_dir(&new_id);
    if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
    }
    move_dir(staging.path(), &dest)?;

    if new_id != old.id && old.file_path.exists() {
        std::fs::remove_dir_all(&old.file_path)?;
    }

    let security_status = if report.is_clean() {
        SecurityStatus::Safe
    } else {
        SecurityStatus::Warning
    };
    let mut record = ExtensionRecord::new(
        package.manifest.clone(),
        dest,
        integrity_hash,
        security_status,
        &old.installed_by,
    );
    record.status = ExtensionStatus::Inactive;
    record.installed_at = old.installed_at;

    inner.store.remove(&old.id);
    inner.store.upsert(record.clone());
    inner.store.save()?;

    info!("Swapped {} to version {}", old.id, record.version);
    Ok(record)
}

fn restore_extension_version(
    inner: &mut RegistryInner,
    failed_id: &str,
    original: &ExtensionRecord,
    backup_dir: &Path,
) -> Result<()> {
    if !backup_dir.is_dir() {
        return Err(Error::rollback_failed(
            &original.id,
            format!("backup directory missing: {:?}", backup_dir),
        ));
    }

    if failed_id != original.id {
        if let Some(failed) = inner.store.get(failed_id) {
            if failed.file_path.exists() {
                std::fs::remove_dir_all(&failed.file_path)?;
            }
        }
    }

    let dest = inner.paths.extension_dir(&original.id);
    if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
    }
    // Copy rather than move: the backup stays until its job deletes it
    copy_dir(backup_dir, &dest)?;

    let mut record = original.clone();
    record.status = ExtensionStatus::Inactive;
    record.is_enabled = false;
    record.file_path = dest;
    record.touch();

    inner.store.remove(failed_id);
    inner.store.upsert(record);
    inner.store.save()?;

    info!("Restored {} from backup", original.id);
    Ok(())
}

/// Hoist `{name}/`-prefixed content to the package root.
///
/// Authors either lay files out flat or under a directory named after the
/// package; installed trees always use the flat shape.
fn flatten_package_root(root: &Path, name: &str) -> Result<()> {
    let nested = root.join(name);
    if !nested.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(&nested)? {
        let entry = entry?;
        let target = root.join(entry.file_name());
        if target.exists() {
            warn!(
                "Keeping root copy of {:?} over nested duplicate",
                entry.file_name()
            );
            continue;
        }
        std::fs::rename(entry.path(), &target)?;
    }

    if std::fs::read_dir(&nested)?.next().is_none() {
        std::fs::remove_dir(&nested)?;
    }
    Ok(())
}
