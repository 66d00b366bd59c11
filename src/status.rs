//! Pipeline status
//!
//! Counters and timestamps written by the two loops and read by the
//! `/status` endpoint. Explicit shared state, handed to each task at startup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::constants;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// The loop started; false with a reason when startup failed
    pub enabled: bool,
    pub disabled_reason: Option<String>,
    /// Persisted cursor position (unix seconds)
    pub cursor: Option<i64>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub polls: u64,
    pub polls_skipped: u64,
    pub cycles_failed: u64,
    pub records_fetched: u64,
    pub records_malformed: u64,
    pub docs_written: u64,
    pub docs_failed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichStatus {
    pub last_scan_at: Option<DateTime<Utc>>,
    pub scans: u64,
    pub scans_skipped: u64,
    pub scored: u64,
    pub summarized: u64,
    pub failed: u64,
    pub scorer_loaded: bool,
    pub scorer_model: Option<String>,
    pub context_enabled: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub sync: SyncStatus,
    pub enrich: EnrichStatus,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            version: constants::APP_VERSION,
            started_at: Utc::now(),
            sync: SyncStatus::default(),
            enrich: EnrichStatus::default(),
        }
    }
}

/// Cheaply cloneable handle to the status
#[derive(Debug, Clone, Default)]
pub struct SharedStatus(Arc<RwLock<PipelineStatus>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_sync<F: FnOnce(&mut SyncStatus)>(&self, f: F) {
        f(&mut self.0.write().sync);
    }

    pub fn update_enrich<F: FnOnce(&mut EnrichStatus)>(&self, f: F) {
        f(&mut self.0.write().enrich);
    }

    pub fn snapshot(&self) -> PipelineStatus {
        self.0.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_visible_in_snapshot() {
        let status = SharedStatus::new();
        let clone = status.clone();
        clone.update_sync(|s| {
            s.polls += 1;
            s.cursor = Some(42);
        });
        status.update_enrich(|e| e.scored += 3);

        let snap = status.snapshot();
        assert_eq!(snap.sync.polls, 1);
        assert_eq!(snap.sync.cursor, Some(42));
        assert_eq!(snap.enrich.scored, 3);
    }
}
