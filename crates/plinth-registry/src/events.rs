//! Extension lifecycle events and the envelope they ship in

use chrono::{DateTime, Utc};
use plinth_core::types::ExtensionStatus;
use serde::{Deserialize, Serialize};

/// Extension lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionEvent {
    /// Package passed validation and installation began
    InstallStarted,

    /// Package installed and registered
    InstallCompleted { integrity_hash: String },

    /// Installation was rejected
    InstallFailed { error_message: String },

    /// Extension initialized and reached active
    EnableSucceeded,

    /// Loading or initialization failed
    EnableFailed { error_message: String },

    /// Extension deactivated
    Disabled,

    /// Files relocated into the quarantine tree
    Quarantined { reason: String },

    /// Manual approval returned a quarantined extension to inactive
    Approved,

    /// Update job began its backup/swap sequence
    UpdateStarted { from_version: String, to_version: String },

    /// Update swapped and enabled the new version
    UpdateCompleted { from_version: String, to_version: String },

    /// Update failed and the prior version was restored
    UpdateRolledBack {
        target_version: String,
        error_message: String,
    },

    /// Update failed and no rollback was possible
    UpdateFailed {
        target_version: String,
        error_message: String,
    },

    /// Record and files deleted
    Removed,
}

impl ExtensionEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            ExtensionEvent::InstallStarted => "install_started",
            ExtensionEvent::InstallCompleted { .. } => "install_completed",
            ExtensionEvent::InstallFailed { .. } => "install_failed",
            ExtensionEvent::EnableSucceeded => "enable_succeeded",
            ExtensionEvent::EnableFailed { .. } => "enable_failed",
            ExtensionEvent::Disabled => "disabled",
            ExtensionEvent::Quarantined { .. } => "quarantined",
            ExtensionEvent::Approved => "approved",
            ExtensionEvent::UpdateStarted { .. } => "update_started",
            ExtensionEvent::UpdateCompleted { .. } => "update_completed",
            ExtensionEvent::UpdateRolledBack { .. } => "update_rolled_back",
            ExtensionEvent::UpdateFailed { .. } => "update_failed",
            ExtensionEvent::Removed => "removed",
        }
    }
}

/// Event metadata envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUID v4)
    pub event_id: String,

    /// Event timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// Extension name (for indexing)
    pub extension: String,

    /// Extension version the event refers to
    pub version: String,

    /// Host release that published the event
    pub host_version: String,

    /// Status before the event, absent for fresh installs
    pub state_before: Option<ExtensionStatus>,

    /// Status after the event, absent once the record is removed
    pub state_after: Option<ExtensionStatus>,

    /// The actual event payload
    pub event: ExtensionEvent,
}

impl EventEnvelope {
    pub fn new(
        extension: &str,
        version: &str,
        state_before: Option<ExtensionStatus>,
        state_after: Option<ExtensionStatus>,
        event: ExtensionEvent,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            extension: extension.to_string(),
            version: version.to_string(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            state_before,
            state_after,
            event,
        }
    }
}
