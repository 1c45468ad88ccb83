//! Update job and outcome types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One accepted update request, queued for the background worker
#[derive(Debug, Clone)]
pub struct UpdateJob {
    /// Extension id to update (`{name}_{version}`)
    pub extension_id: String,

    /// Version the extension should end up at
    pub target_version: String,

    /// Who asked for the update
    pub requested_by: String,

    /// When the job was accepted (UTC)
    pub scheduled_at: DateTime<Utc>,
}

impl UpdateJob {
    pub fn new(extension_id: &str, target_version: &str, requested_by: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            target_version: target_version.to_string(),
            requested_by: requested_by.to_string(),
            scheduled_at: Utc::now(),
        }
    }
}

/// Terminal outcome of one update job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// New version swapped in and enabled
    Completed {
        from_version: String,
        to_version: String,
    },

    /// Update did not take effect; the prior version is intact
    RolledBack {
        target_version: String,
        error_message: String,
    },

    /// Update failed and rollback could not restore the prior version
    Failed {
        target_version: String,
        error_message: String,
    },
}

/// Whether an update is currently in flight for an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    Updating,
    NoUpdate,
}
