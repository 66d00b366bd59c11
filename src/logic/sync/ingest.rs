//! Sync/Ingest Loop
//!
//! One poll: fetch the delta since the cursor, normalize, bulk-upsert,
//! then advance and persist the cursor. The cursor never moves past a
//! record that is not durably in the index, and never to a timestamp the
//! normalizer cannot represent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::cursor::{CursorStore, SyncCursor};
use crate::error::{PipelineError, PipelineResult};
use crate::logic::features::{normalize, unix_time, FeatureDocument, NormalizeContext};
use crate::logic::index::SearchIndex;
use crate::logic::kismet::{RawDeviceRecord, TelemetrySource};
use crate::status::SharedStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// Every document of the batch was written
    Completed,
    /// Some documents were rejected; cursor stops short of them
    Partial,
    /// Nothing new since the cursor
    Idle,
    /// Another poll was still running
    Skipped,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::Completed => "completed",
            PollOutcome::Partial => "partial",
            PollOutcome::Idle => "idle",
            PollOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub cursor_before: i64,
    pub cursor_after: i64,
    /// Records returned by the telemetry source
    pub fetched: usize,
    /// Newer records left for the next poll by the batch bound
    pub deferred: usize,
    pub malformed: usize,
    /// Distinct documents sent to the index
    pub documents: usize,
    pub written: usize,
    pub failed: usize,
}

impl PollReport {
    fn new(outcome: PollOutcome, cursor: i64) -> Self {
        Self {
            outcome,
            cursor_before: cursor,
            cursor_after: cursor,
            fetched: 0,
            deferred: 0,
            malformed: 0,
            documents: 0,
            written: 0,
            failed: 0,
        }
    }
}

/// Sort by `last_time` and cut at `limit` without splitting the records
/// that share the boundary timestamp. A boundary group that starts the
/// batch is taken whole even when it exceeds `limit`.
pub fn bound_batch(
    mut records: Vec<(i64, RawDeviceRecord)>,
    limit: usize,
) -> (Vec<(i64, RawDeviceRecord)>, usize) {
    records.sort_by_key(|(ts, _)| *ts);
    let limit = limit.max(1);
    if records.len() <= limit {
        return (records, 0);
    }

    let boundary = records[limit - 1].0;
    let group_start = records.partition_point(|(ts, _)| *ts < boundary);
    let cut = if group_start > 0 {
        group_start
    } else {
        records.partition_point(|(ts, _)| *ts <= boundary)
    };

    let deferred = records.split_off(cut).len();
    (records, deferred)
}

/// Next cursor position for a processed batch.
///
/// `batch_ts` holds the timestamp of every record taken into the batch,
/// `failed_ts` those of records whose documents were not written. With no
/// failures the cursor goes to the newest record; otherwise to the newest
/// record strictly older than the oldest failure.
pub fn next_cursor(batch_ts: &[i64], failed_ts: &[i64]) -> Option<i64> {
    match failed_ts.iter().min() {
        None => batch_ts.iter().max().copied(),
        Some(&oldest_failed) => batch_ts.iter().copied().filter(|t| *t < oldest_failed).max(),
    }
}

struct Pending {
    doc: FeatureDocument,
    /// Oldest record folded into this document
    first_ts: i64,
    /// Newest record folded into this document
    last_ts: i64,
}

/// Collapse documents sharing an id; the later observation wins
fn collapse(docs: Vec<(i64, FeatureDocument)>) -> Vec<Pending> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Pending> = Vec::with_capacity(docs.len());

    for (ts, doc) in docs {
        let id = doc.doc_id();
        match positions.get(&id) {
            Some(&pos) => {
                out[pos].first_ts = out[pos].first_ts.min(ts);
                out[pos].last_ts = out[pos].last_ts.max(ts);
                out[pos].doc = doc;
            }
            None => {
                positions.insert(id, out.len());
                out.push(Pending { doc, first_ts: ts, last_ts: ts });
            }
        }
    }
    out
}

pub struct SyncLoop {
    source: Arc<dyn TelemetrySource>,
    index: Arc<dyn SearchIndex>,
    store: CursorStore,
    /// Held for the whole poll; doubles as the single-flight guard
    cursor: Mutex<SyncCursor>,
    ctx: NormalizeContext,
    batch_size: usize,
    status: SharedStatus,
}

impl SyncLoop {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        index: Arc<dyn SearchIndex>,
        store: CursorStore,
        cursor: SyncCursor,
        ctx: NormalizeContext,
        batch_size: usize,
        status: SharedStatus,
    ) -> Self {
        status.update_sync(|s| {
            s.enabled = true;
            s.disabled_reason = None;
            s.cursor = Some(cursor.last_seen);
        });
        Self {
            source,
            index,
            store,
            cursor: Mutex::new(cursor),
            ctx,
            batch_size,
            status,
        }
    }

    /// Current cursor (waits for a running poll)
    pub async fn cursor(&self) -> SyncCursor {
        self.cursor.lock().await.clone()
    }

    pub async fn poll_once(&self) -> PipelineResult<PollReport> {
        let Ok(mut cursor) = self.cursor.try_lock() else {
            debug!("sync poll still running, skipping tick");
            self.status.update_sync(|s| s.polls_skipped += 1);
            let last_known = self.status.snapshot().sync.cursor.unwrap_or_default();
            return Ok(PollReport::new(PollOutcome::Skipped, last_known));
        };

        let result = self.poll_locked(&mut cursor).await;
        self.record(&result);
        result
    }

    /// Boundary-second record whose document an earlier poll already wrote.
    /// Malformed boundary records count as seen: they can never be written.
    fn is_repeat(&self, cursor: &SyncCursor, ts: i64, record: &RawDeviceRecord) -> bool {
        match normalize(record, &self.ctx) {
            Ok(doc) => cursor.already_written(ts, &doc.doc_id()),
            Err(_) => true,
        }
    }

    async fn poll_locked(&self, cursor: &mut SyncCursor) -> PipelineResult<PollReport> {
        let since = cursor.last_seen;
        let mut report = PollReport::new(PollOutcome::Idle, since);

        let records = self.source.fetch_since(since).await?;
        report.fetched = records.len();

        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            let Some(ts) = record.last_time().filter(|ts| unix_time(*ts).is_some()) else {
                report.malformed += 1;
                warn!(record = %record.hint(), last_time = ?record.last_time(), "skipping record without a usable last_time");
                continue;
            };
            if ts < since || (ts == since && self.is_repeat(cursor, ts, &record)) {
                continue;
            }
            fresh.push((ts, record));
        }

        let (batch, deferred) = bound_batch(fresh, self.batch_size);
        report.deferred = deferred;
        if batch.is_empty() {
            return Ok(report);
        }

        let batch_ts: Vec<i64> = batch.iter().map(|(ts, _)| *ts).collect();
        let mut docs = Vec::with_capacity(batch.len());
        for (ts, record) in &batch {
            match normalize(record, &self.ctx) {
                Ok(doc) => docs.push((*ts, doc)),
                Err(e) => {
                    report.malformed += 1;
                    warn!(record = %e.hint, error = %e.reason, "skipping malformed record");
                }
            }
        }

        let pending = collapse(docs);
        report.documents = pending.len();

        let mut rejected: HashSet<String> = HashSet::new();
        let failed_ts: Vec<i64> = if pending.is_empty() {
            Vec::new()
        } else {
            let batch_docs: Vec<FeatureDocument> = pending.iter().map(|p| p.doc.clone()).collect();
            let outcome = self.index.upsert_batch(&batch_docs).await?;
            report.written = outcome.written;
            report.failed = outcome.failed.len();

            let first_ts: HashMap<String, i64> = pending
                .iter()
                .map(|p| (p.doc.doc_id(), p.first_ts))
                .collect();
            outcome
                .failed
                .iter()
                .map(|f| {
                    warn!(doc_id = %f.id, status = f.status, error = %f.reason, "document rejected by index");
                    rejected.insert(f.id.clone());
                    // Unknown ids hold the cursor at the oldest record of the batch
                    first_ts.get(&f.id).copied().unwrap_or(batch_ts[0])
                })
                .collect()
        };

        report.outcome = if failed_ts.is_empty() {
            PollOutcome::Completed
        } else {
            PollOutcome::Partial
        };

        if let Some(next) = next_cursor(&batch_ts, &failed_ts) {
            if next >= cursor.last_seen {
                let boundary_ids = pending
                    .iter()
                    .filter(|p| p.first_ts <= next && next <= p.last_ts)
                    .map(|p| p.doc.doc_id())
                    .filter(|id| !rejected.contains(id));
                let mut advanced = cursor.clone();
                if advanced.advance(next, report.written as u64, boundary_ids) {
                    self.store.save(&advanced)?;
                    *cursor = advanced;
                }
            }
        }
        report.cursor_after = cursor.last_seen;

        info!(
            outcome = report.outcome.as_str(),
            cursor = report.cursor_after,
            fetched = report.fetched,
            written = report.written,
            failed = report.failed,
            malformed = report.malformed,
            deferred = report.deferred,
            "sync poll finished"
        );
        Ok(report)
    }

    fn record(&self, result: &PipelineResult<PollReport>) {
        self.status.update_sync(|s| {
            s.polls += 1;
            s.last_poll_at = Some(Utc::now());
            match result {
                Ok(report) => {
                    s.cursor = Some(report.cursor_after);
                    s.last_outcome = Some(report.outcome.as_str().to_string());
                    s.records_fetched += report.fetched as u64;
                    s.records_malformed += report.malformed as u64;
                    s.docs_written += report.written as u64;
                    s.docs_failed += report.failed as u64;
                }
                Err(e) => {
                    s.cycles_failed += 1;
                    s.last_outcome = Some("abandoned".to_string());
                    s.last_error = Some(e.to_string());
                }
            }
        });

        if let Err(e) = result {
            match e {
                PipelineError::Dependency(dep) => error!(
                    service = %dep.service(),
                    kind = dep.kind(),
                    error = %dep,
                    "sync cycle abandoned, cursor unchanged"
                ),
                other => error!(error = %other, "sync cycle failed, cursor unchanged"),
            }
        }
    }
}
