//! Background update orchestration
//!
//! A single worker task drains a bounded FIFO queue of update jobs. Per
//! job: fetch and validate the target package, back up the current files,
//! disable, swap, migrate (best-effort), enable. A failure after the swap
//! begins restores the backup and re-enables the prior version; a rollback
//! that cannot restore the files is surfaced loudly as a failed outcome.
//! Admission keeps an in-flight id set so the same extension never has two
//! jobs racing.

use crate::backup::BackupManager;
use crate::job::{UpdateJob, UpdateOutcome, UpdateStatus};
use crate::source::PackageSource;
use anyhow::{anyhow, Context};
use plinth_core::types::{ExtensionRecord, ExtensionStatus};
use plinth_core::{is_breaking_update, Error, HostPaths, PackageVersion, Result};
use plinth_package::{ExtensionPackage, PackageValidator};
use plinth_registry::{EventEnvelope, ExtensionEvent, ExtensionRegistry, StatusLedger};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Bound of the pending-job queue
const UPDATE_QUEUE_CAPACITY: usize = 64;

struct QueuedJob {
    job: UpdateJob,
    ack: oneshot::Sender<UpdateOutcome>,
}

/// Accepts update jobs and reports their progress
pub struct UpdateOrchestrator {
    queue: mpsc::Sender<QueuedJob>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    registry: Arc<ExtensionRegistry>,
}

impl UpdateOrchestrator {
    /// Start the orchestrator and its background worker
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        source: Arc<dyn PackageSource>,
        paths: &HostPaths,
    ) -> Result<Self> {
        let validator = PackageValidator::new()?;
        let (queue, jobs) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let worker = UpdateWorker {
            registry: registry.clone(),
            source,
            validator,
            backups: BackupManager::new(paths),
            ledger: StatusLedger::new(paths.ledger_file()),
            in_flight: in_flight.clone(),
        };
        tokio::spawn(worker.run(jobs));

        Ok(Self {
            queue,
            in_flight,
            registry,
        })
    }

    /// Accept an update job for a registered extension.
    ///
    /// Rejects unknown ids and extensions that already have a job in
    /// flight. The returned channel resolves to the job's terminal
    /// outcome; dropping it does not cancel the job.
    pub async fn schedule_update(
        &self,
        extension_id: &str,
        target_version: &str,
        requested_by: &str,
    ) -> Result<oneshot::Receiver<UpdateOutcome>> {
        if self.registry.get(extension_id).await.is_none() {
            return Err(Error::extension_not_found(extension_id));
        }

        // Membership check and insert are one step under the lock
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(extension_id.to_string()) {
                return Err(Error::update_in_progress(extension_id));
            }
        }

        let job = UpdateJob::new(extension_id, target_version, requested_by);
        info!(
            "Accepted update job: {} -> {} (requested by {})",
            extension_id, target_version, requested_by
        );

        let (ack, outcome) = oneshot::channel();
        if self.queue.send(QueuedJob { job, ack }).await.is_err() {
            self.in_flight.lock().unwrap().remove(extension_id);
            return Err(Error::OrchestratorUnavailable);
        }

        Ok(outcome)
    }

    /// Whether an update is currently in flight for the extension
    pub fn update_status(&self, extension_id: &str) -> UpdateStatus {
        if self.in_flight.lock().unwrap().contains(extension_id) {
            UpdateStatus::Updating
        } else {
            UpdateStatus::NoUpdate
        }
    }
}

/// The background task owning the job pipeline
struct UpdateWorker {
    registry: Arc<ExtensionRegistry>,
    source: Arc<dyn PackageSource>,
    validator: PackageValidator,
    backups: BackupManager,
    ledger: StatusLedger,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl UpdateWorker {
    async fn run(self, mut jobs: mpsc::Receiver<QueuedJob>) {
        while let Some(QueuedJob { job, ack }) = jobs.recv().await {
            let extension_id = job.extension_id.clone();
            let outcome = self.process(&job).await;

            // The id leaves the in-flight set whatever the outcome was
            self.in_flight.lock().unwrap().remove(&extension_id);

            if ack.send(outcome).is_err() {
                debug!("Update outcome for {} had no listener", extension_id);
            }
        }
        debug!("Update queue closed, worker exiting");
    }

    async fn process(&self, job: &UpdateJob) -> UpdateOutcome {
        info!(
            "Starting update of {} to {}",
            job.extension_id, job.target_version
        );

        let Some(current) = self.registry.get(&job.extension_id).await else {
            return self.fatal(job, None, "extension is no longer installed".to_string());
        };

        self.record_event(
            &current.name,
            &current.version,
            Some(current.status),
            None,
            ExtensionEvent::UpdateStarted {
                from_version: current.version.clone(),
                to_version: job.target_version.clone(),
            },
        );

        // Nothing is touched until the target package checks out
        let package = match self.fetch_target(&current, job).await {
            Ok(package) => package,
            Err(e) => return self.abort(job, &current, e),
        };

        if !current.file_path.is_dir() {
            return self.abort(
                job,
                &current,
                anyhow!("installed files missing at {:?}", current.file_path),
            );
        }
        let backup_dir = match self.backups.create(&current.id, &current.file_path) {
            Ok(dir) => dir,
            Err(e) => return self.abort(job, &current, e),
        };

        if let Err(e) = self.registry.disable(&current.id).await {
            self.backups.delete(&backup_dir);
            return self.abort(
                job,
                &current,
                anyhow::Error::new(e).context("disable before swap"),
            );
        }

        // Past this point failures restore the backup
        let swapped = match self.registry.swap_version(&current.id, &package).await {
            Ok(record) => record,
            Err(e) => {
                let cause = anyhow::Error::new(e).context("swap to new version");
                return self
                    .roll_back(job, &current, &current.id, &backup_dir, cause)
                    .await;
            }
        };

        if let Err(e) = self
            .registry
            .migrate_version(&swapped.id, &current.version)
            .await
        {
            warn!("Migration hook failed for {} (continuing): {}", swapped.id, e);
        }

        if let Err(e) = self.registry.enable(&swapped.id).await {
            let cause = anyhow::Error::new(e).context("enable new version");
            return self
                .roll_back(job, &current, &swapped.id, &backup_dir, cause)
                .await;
        }

        self.backups.delete(&backup_dir);
        self.record_event(
            &current.name,
            &job.target_version,
            None,
            Some(ExtensionStatus::Active),
            ExtensionEvent::UpdateCompleted {
                from_version: current.version.clone(),
                to_version: job.target_version.clone(),
            },
        );
        info!(
            "Updated {} from {} to {}",
            current.name, current.version, job.target_version
        );

        UpdateOutcome::Completed {
            from_version: current.version.clone(),
            to_version: job.target_version.clone(),
        }
    }

    /// Fetch the target archive and hold it against the request
    async fn fetch_target(
        &self,
        current: &ExtensionRecord,
        job: &UpdateJob,
    ) -> anyhow::Result<ExtensionPackage> {
        let bytes = self
            .source
            .fetch(&current.name, &job.target_version)
            .await
            .context("package retrieval failed")?;

        let package = self
            .validator
            .validate(&bytes)
            .context("target package failed validation")?;

        if package.manifest.name != current.name {
            return Err(anyhow!(
                "target package name {} does not match {}",
                package.manifest.name,
                current.name
            ));
        }
        if package.manifest.version != job.target_version {
            return Err(anyhow!(
                "target package version {} does not match requested {}",
                package.manifest.version,
                job.target_version
            ));
        }

        if let (Ok(from), Ok(to)) = (
            PackageVersion::parse_lenient(&current.version),
            PackageVersion::parse_lenient(&package.manifest.version),
        ) {
            if is_breaking_update(&from, &to) {
                warn!(
                    "Update of {} to {} crosses a major version boundary",
                    current.name, job.target_version
                );
            }
        }

        Ok(package)
    }

    /// A failure before the swap began: the prior version is untouched
    fn abort(
        &self,
        job: &UpdateJob,
        current: &ExtensionRecord,
        cause: anyhow::Error,
    ) -> UpdateOutcome {
        let message = format!("{:#}", cause);
        warn!(
            "Update of {} to {} aborted, prior version untouched: {}",
            job.extension_id, job.target_version, message
        );

        self.record_event(
            &current.name,
            &current.version,
            None,
            Some(current.status),
            ExtensionEvent::UpdateRolledBack {
                target_version: job.target_version.clone(),
                error_message: message.clone(),
            },
        );

        UpdateOutcome::RolledBack {
            target_version: job.target_version.clone(),
            error_message: message,
        }
    }

    /// A failure after the swap began: restore the backup and re-enable
    /// the prior version if it was enabled before the job
    async fn roll_back(
        &self,
        job: &UpdateJob,
        original: &ExtensionRecord,
        failed_id: &str,
        backup_dir: &Path,
        cause: anyhow::Error,
    ) -> UpdateOutcome {
        warn!(
            "Update of {} to {} failed, restoring backup: {:#}",
            job.extension_id, job.target_version, cause
        );

        if let Err(e) = self
            .registry
            .restore_version(failed_id, original, backup_dir)
            .await
        {
            return self.fatal(
                job,
                Some(original),
                format!(
                    "rollback could not restore {}: {} (update error: {:#})",
                    original.id, e, cause
                ),
            );
        }

        let mut restored_state = ExtensionStatus::Inactive;
        if original.is_enabled {
            match self.registry.enable(&original.id).await {
                Ok(()) => restored_state = ExtensionStatus::Active,
                Err(e) => {
                    return self.fatal(
                        job,
                        Some(original),
                        format!(
                            "restored {} but re-enable failed: {} (update error: {:#})",
                            original.id, e, cause
                        ),
                    );
                }
            }
        }

        self.backups.delete(backup_dir);
        let message = format!("{:#}", cause);
        self.record_event(
            &original.name,
            &original.version,
            None,
            Some(restored_state),
            ExtensionEvent::UpdateRolledBack {
                target_version: job.target_version.clone(),
                error_message: message.clone(),
            },
        );
        info!("Rolled {} back to {}", original.name, original.version);

        UpdateOutcome::RolledBack {
            target_version: job.target_version.clone(),
            error_message: message,
        }
    }

    /// The extension could not be put back together
    fn fatal(
        &self,
        job: &UpdateJob,
        original: Option<&ExtensionRecord>,
        message: String,
    ) -> UpdateOutcome {
        error!(
            "CRITICAL: update of {} to {} left the extension unrestored: {}",
            job.extension_id, job.target_version, message
        );

        let (name, version) = match original {
            Some(record) => (record.name.as_str(), record.version.as_str()),
            None => (job.extension_id.as_str(), job.target_version.as_str()),
        };
        self.record_event(
            name,
            version,
            None,
            None,
            ExtensionEvent::UpdateFailed {
                target_version: job.target_version.clone(),
                error_message: message.clone(),
            },
        );

        UpdateOutcome::Failed {
            target_version: job.target_version.clone(),
            error_message: message,
        }
    }

    fn record_event(
        &self,
        extension: &str,
        version: &str,
        state_before: Option<ExtensionStatus>,
        state_after: Option<ExtensionStatus>,
        event: ExtensionEvent,
    ) {
        let envelope = EventEnvelope::new(extension, version, state_before, state_after, event);
        if let Err(e) = self.ledger.append(&envelope) {
            warn!("Failed to record update event: {}", e);
        }
    }
}
