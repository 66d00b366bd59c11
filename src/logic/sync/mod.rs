//! Sync Module - Kismet → index delta sync
//!
//! ## Structure
//! - `cursor`: Persisted sync position
//! - `ingest`: Poll loop (fetch, normalize, bulk upsert, advance)

pub mod cursor;
pub mod ingest;

pub use cursor::{CursorError, CursorStore, SyncCursor};
pub use ingest::{bound_batch, next_cursor, PollOutcome, PollReport, SyncLoop};
