//! Append-only audit trail of lifecycle transitions
//!
//! Every operation appends one [`EventEnvelope`] as a single JSON line to
//! `events.jsonl`, under an exclusive file lock with sync-to-disk. The
//! file can be folded into a latest-state-per-extension map for status
//! queries. A malformed line is skipped with a warning, never fatal: the
//! ledger must stay readable even after a partial write.

use crate::events::EventEnvelope;
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use plinth_core::types::ExtensionStatus;
use plinth_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;

/// Latest known state of one extension, derived from the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub extension: String,
    pub state: Option<ExtensionStatus>,
    pub version: String,
    pub last_event_id: String,
    pub last_event_time: DateTime<Utc>,
}

/// Status ledger implementation
pub struct StatusLedger {
    ledger_path: PathBuf,
}

impl StatusLedger {
    /// Create a ledger handle for the given path
    pub fn new(ledger_path: PathBuf) -> Self {
        Self { ledger_path }
    }

    /// Append an envelope (atomic, file-locked)
    pub fn append(&self, envelope: &EventEnvelope) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)?;

        // Exclusive lock, released when `file` drops
        file.lock_exclusive()?;

        let json_line = serde_json::to_string(envelope)?;
        writeln!(file, "{}", json_line)?;
        file.sync_all()?;

        Ok(())
    }

    /// Fold the ledger into the latest state per extension
    pub fn latest_status(&self) -> Result<HashMap<String, LedgerStatus>> {
        let mut status_map: HashMap<String, LedgerStatus> = HashMap::new();

        for envelope in self.read_envelopes()? {
            status_map
                .entry(envelope.extension.clone())
                .and_modify(|status| {
                    if envelope.timestamp >= status.last_event_time {
                        status.state = envelope.state_after;
                        status.version = envelope.version.clone();
                        status.last_event_id = envelope.event_id.clone();
                        status.last_event_time = envelope.timestamp;
                    }
                })
                .or_insert_with(|| LedgerStatus {
                    extension: envelope.extension.clone(),
                    state: envelope.state_after,
                    version: envelope.version.clone(),
                    last_event_id: envelope.event_id.clone(),
                    last_event_time: envelope.timestamp,
                });
        }

        Ok(status_map)
    }

    /// Event history for one extension, chronological
    pub fn history(&self, extension: &str, limit: Option<usize>) -> Result<Vec<EventEnvelope>> {
        let mut events: Vec<EventEnvelope> = self
            .read_envelopes()?
            .into_iter()
            .filter(|envelope| envelope.extension == extension)
            .collect();

        if let Some(limit) = limit {
            if events.len() > limit {
                events = events.split_off(events.len() - limit);
            }
        }

        Ok(events)
    }

    fn read_envelopes(&self) -> Result<Vec<EventEnvelope>> {
        if !self.ledger_path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.ledger_path)?;
        let reader = BufReader::new(file);
        let mut envelopes = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    warn!("Skipping malformed ledger line: {}", e);
                }
            }
        }

        Ok(envelopes)
    }
}
