//! Sync Cursor persistence
//!
//! The cursor is the last Kismet `last_time` known to be durably written
//! to the index, plus the ids of the documents already written from that
//! second. Kismet timestamps are whole seconds, so a device can still show
//! up with `last_time == last_seen` after the poll that set the cursor;
//! only the listed ids are treated as repeats. Saved as JSON through a temp file + rename so a crash
//! mid-write leaves the previous cursor intact.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cursor file {path} is corrupt: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Kismet `last_time` (unix seconds) of the newest written record
    pub last_seen: i64,
    pub updated_at: DateTime<Utc>,
    /// Documents written since the cursor file was created
    #[serde(default)]
    pub records_written: u64,
    /// Document ids written from records with `last_time == last_seen`
    #[serde(default)]
    pub boundary_ids: BTreeSet<String>,
}

impl SyncCursor {
    pub fn at(last_seen: i64) -> Self {
        Self {
            last_seen,
            updated_at: Utc::now(),
            records_written: 0,
            boundary_ids: BTreeSet::new(),
        }
    }

    /// Starting position when nothing is persisted
    pub fn initial(now: DateTime<Utc>, lookback_secs: u64) -> Self {
        let lookback = i64::try_from(lookback_secs).unwrap_or(i64::MAX);
        Self {
            last_seen: now.timestamp().saturating_sub(lookback).max(0),
            updated_at: now,
            records_written: 0,
            boundary_ids: BTreeSet::new(),
        }
    }

    /// Move forward to `last_seen`, recording the ids written from that
    /// second. Never moves backwards. Returns whether anything changed.
    pub fn advance<I>(&mut self, last_seen: i64, written: u64, boundary_ids: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        self.records_written += written;
        self.updated_at = Utc::now();
        if last_seen > self.last_seen {
            self.last_seen = last_seen;
            self.boundary_ids = boundary_ids.into_iter().collect();
            true
        } else if last_seen == self.last_seen {
            let before = self.boundary_ids.len();
            self.boundary_ids.extend(boundary_ids);
            self.boundary_ids.len() > before
        } else {
            false
        }
    }

    /// Record at `ts` for document `doc_id` was written by an earlier poll
    pub fn already_written(&self, ts: i64, doc_id: &str) -> bool {
        ts < self.last_seen || (ts == self.last_seen && self.boundary_ids.contains(doc_id))
    }
}

/// File-backed cursor storage
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CursorError {
        CursorError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Persisted cursor, or `None` on first start
    pub fn load(&self) -> Result<Option<SyncCursor>, CursorError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| CursorError::Serialization {
                path: self.path.clone(),
                source,
            })
    }

    /// Persisted cursor, or the lookback start position
    pub fn load_or_initial(&self, lookback_secs: u64) -> Result<SyncCursor, CursorError> {
        Ok(self
            .load()?
            .unwrap_or_else(|| SyncCursor::initial(Utc::now(), lookback_secs)))
    }

    /// Atomic write: temp file in the same directory, fsync, rename
    pub fn save(&self, cursor: &SyncCursor) -> Result<(), CursorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let json = serde_json::to_vec_pretty(cursor).map_err(|source| CursorError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            file.write_all(&json).map_err(|e| self.io_err(e))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    /// Delete the persisted cursor
    pub fn reset(&self) -> Result<(), CursorError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("cursor.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("nested").join("cursor.json"));

        let mut cursor = SyncCursor::at(1_700_000_000);
        cursor.advance(1_700_000_050, 12, ["s1:aa:bb:cc:dd:ee:01".to_string()]);
        store.save(&cursor).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_seen, 1_700_000_050);
        assert_eq!(loaded.records_written, 12);
        assert!(loaded.already_written(1_700_000_050, "s1:aa:bb:cc:dd:ee:01"));
        assert!(!dir.path().join("nested").join("cursor.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = CursorStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CursorError::Serialization { .. }));
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("cursor.json"));
        store.save(&SyncCursor::at(5)).unwrap();
        store.reset().unwrap();
        assert!(store.load().unwrap().is_none());
        store.reset().unwrap();
    }

    #[test]
    fn test_initial_applies_lookback() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        assert_eq!(SyncCursor::initial(now, 3600).last_seen, 6400);
        assert_eq!(SyncCursor::initial(now, 1_000_000).last_seen, 0);
    }

    #[test]
    fn test_advance_never_moves_back() {
        let mut cursor = SyncCursor::at(100);
        assert!(!cursor.advance(50, 1, Vec::new()));
        assert_eq!(cursor.last_seen, 100);
        assert!(cursor.advance(150, 1, Vec::new()));
        assert_eq!(cursor.records_written, 2);
    }

    #[test]
    fn test_boundary_ids_grow_within_second_and_reset_after() {
        let mut cursor = SyncCursor::at(100);
        assert!(cursor.advance(120, 1, ["a".to_string()]));
        assert!(cursor.advance(120, 1, ["b".to_string()]));
        assert!(!cursor.advance(120, 0, ["a".to_string()]));
        assert!(cursor.already_written(120, "a"));
        assert!(cursor.already_written(120, "b"));
        assert!(!cursor.already_written(120, "c"));
        assert!(cursor.already_written(119, "c"));

        assert!(cursor.advance(130, 1, ["c".to_string()]));
        assert!(!cursor.already_written(130, "a"));
        assert_eq!(cursor.boundary_ids.len(), 1);
    }

    #[test]
    fn test_cursor_file_without_boundary_ids_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        fs::write(&path, br#"{"last_seen": 42, "updated_at": "2024-01-01T00:00:00Z"}"#).unwrap();
        let loaded = CursorStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.last_seen, 42);
        assert!(loaded.boundary_ids.is_empty());
    }
}
