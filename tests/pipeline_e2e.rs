//! End-to-end pipeline behaviour against in-memory fakes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use wids_pipeline::error::{Dependency, DependencyError};
use wids_pipeline::logic::context::{ContextGenerator, ContextPrompt, LlmError};
use wids_pipeline::logic::enrich::{EnrichField, EnrichmentScanner, ScanSettings};
use wids_pipeline::logic::features::{AnomalyLabel, FeatureVector, IdentityMode, NormalizeContext, SensorInfo};
use wids_pipeline::logic::index::{MemoryIndex, SearchIndex};
use wids_pipeline::logic::kismet::{RawDeviceRecord, TelemetrySource};
use wids_pipeline::logic::model::{AnomalyScorer, AnomalyVerdict, ScoreError};
use wids_pipeline::logic::sync::{CursorStore, PollOutcome, SyncLoop};
use wids_pipeline::status::SharedStatus;

// ============================================================================
// FAKES
// ============================================================================

#[derive(Default)]
struct Telemetry {
    records: Mutex<Vec<RawDeviceRecord>>,
}

impl Telemetry {
    fn push(&self, value: serde_json::Value) {
        self.records.lock().push(RawDeviceRecord::from(value));
    }
}

#[async_trait]
impl TelemetrySource for Telemetry {
    async fn fetch_since(&self, since: i64) -> Result<Vec<RawDeviceRecord>, DependencyError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.last_time().map_or(true, |t| t >= since))
            .cloned()
            .collect())
    }
}

struct ThresholdScorer;

impl AnomalyScorer for ThresholdScorer {
    fn score(&self, features: &FeatureVector) -> Result<AnomalyVerdict, ScoreError> {
        let entropy = features.values[0] as f64;
        Ok(AnomalyVerdict {
            score: 0.5 - entropy / 10.0,
            label: if entropy > 4.0 { AnomalyLabel::Anomalous } else { AnomalyLabel::Normal },
        })
    }

    fn model_id(&self) -> &str {
        "iforest-v1"
    }
}

/// Never answers
struct HungGenerator;

#[async_trait]
impl ContextGenerator for HungGenerator {
    async fn generate(&self, _prompt: &ContextPrompt) -> Result<String, LlmError> {
        std::future::pending::<()>().await;
        Err(DependencyError::transient(Dependency::ContextGenerator, "unreachable").into())
    }

    fn model_name(&self) -> &str {
        "hung"
    }
}

struct CannedGenerator;

#[async_trait]
impl ContextGenerator for CannedGenerator {
    async fn generate(&self, _prompt: &ContextPrompt) -> Result<String, LlmError> {
        Ok("Consumer access point, nothing unusual.".to_string())
    }

    fn model_name(&self) -> &str {
        "llama3.1"
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn ctx() -> NormalizeContext {
    NormalizeContext {
        sensor: SensorInfo { id: "sensor-a".into(), site: Some("lab".into()) },
        identity: IdentityMode::Latest,
    }
}

fn device(mac: &str, ssid: &str, ts: i64) -> serde_json::Value {
    json!({
        "macaddr": mac,
        "ssid": ssid,
        "last_time": ts,
        "signal_last": -55,
        "signal_min": -70,
        "signal_max": -50,
        "client_count": 2
    })
}

fn settings() -> ScanSettings {
    ScanSettings {
        batch_size: 10,
        concurrency: 4,
        time_window: None,
        score_timeout: Duration::from_secs(1),
        llm_timeout: Duration::from_millis(100),
    }
}

fn sync_loop(source: Arc<Telemetry>, index: Arc<MemoryIndex>, store: &CursorStore, lookback_start: i64) -> SyncLoop {
    let cursor = store
        .load()
        .unwrap()
        .unwrap_or_else(|| wids_pipeline::logic::sync::SyncCursor::at(lookback_start));
    SyncLoop::new(source, index, store.clone(), cursor, ctx(), 100, SharedStatus::new())
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_three_records_two_devices_then_scored() {
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    source.push(device("aa:bb:cc:00:00:01", "HomeNet", 1_000));
    source.push(device("aa:bb:cc:00:00:02", "x7Qp9zLm2Vb", 1_005));
    source.push(device("AA:BB:CC:00:00:01", "HomeNet", 1_010));

    let index = Arc::new(MemoryIndex::new());
    let sync = sync_loop(source, index.clone(), &store, 900);

    let report = sync.poll_once().await.unwrap();
    assert_eq!(report.outcome, PollOutcome::Completed);
    assert_eq!(report.fetched, 3);
    assert_eq!(index.len(), 2);
    assert_eq!(store.load().unwrap().unwrap().last_seen, 1_010);

    let first = index.get("sensor-a:aa:bb:cc:00:00:01").unwrap();
    assert_eq!(first.last_seen.timestamp(), 1_010);

    let scanner = EnrichmentScanner::new(index.clone(), Some(Arc::new(ThresholdScorer)), None, settings(), SharedStatus::new());
    let scan = scanner.scan_for_missing(EnrichField::AnomalyScore).await.unwrap();
    assert_eq!(scan.enriched, 2);

    let random = index.get("sensor-a:aa:bb:cc:00:00:02").unwrap();
    assert!(random.is_scored());
    assert_eq!(random.anomaly_model.as_deref(), Some("iforest-v1"));
}

#[tokio::test]
async fn test_repoll_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    source.push(device("aa:bb:cc:00:00:01", "HomeNet", 2_000));

    let index = Arc::new(MemoryIndex::new());
    let sync = sync_loop(source, index.clone(), &store, 1_000);

    sync.poll_once().await.unwrap();
    let before = index.get_raw("sensor-a:aa:bb:cc:00:00:01").unwrap();

    // Kismet returns the boundary record again; nothing changes
    let again = sync.poll_once().await.unwrap();
    assert_eq!(again.outcome, PollOutcome::Idle);
    assert_eq!(index.len(), 1);
    assert_eq!(index.get_raw("sensor-a:aa:bb:cc:00:00:01").unwrap(), before);
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    source.push(device("aa:bb:cc:00:00:01", "HomeNet", 3_000));

    let index = Arc::new(MemoryIndex::new());
    {
        let sync = sync_loop(source.clone(), index.clone(), &store, 2_000);
        sync.poll_once().await.unwrap();
    }

    source.push(device("aa:bb:cc:00:00:03", "Guest", 3_050));

    // A new process picks up where the old one stopped
    let sync = sync_loop(source, index.clone(), &store, 0);
    assert_eq!(sync.cursor().await.last_seen, 3_000);

    let report = sync.poll_once().await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.cursor_after, 3_050);
    assert_eq!(index.len(), 2);
}

#[tokio::test]
async fn test_resync_keeps_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    source.push(device("aa:bb:cc:00:00:01", "HomeNet", 4_000));

    let index = Arc::new(MemoryIndex::new());
    let sync = sync_loop(source.clone(), index.clone(), &store, 3_000);
    sync.poll_once().await.unwrap();

    let scanner = EnrichmentScanner::new(
        index.clone(),
        Some(Arc::new(ThresholdScorer)),
        Some(Arc::new(CannedGenerator)),
        settings(),
        SharedStatus::new(),
    );
    for report in scanner.tick().await {
        assert_eq!(report.unwrap().enriched, 1);
    }

    // Same device seen again with a newer timestamp
    source.push(device("aa:bb:cc:00:00:01", "HomeNet", 4_100));
    sync.poll_once().await.unwrap();

    let doc = index.get("sensor-a:aa:bb:cc:00:00:01").unwrap();
    assert_eq!(doc.last_seen.timestamp(), 4_100);
    assert!(doc.is_scored());
    assert_eq!(
        doc.context.map(|c| c.summary),
        Some("Consumer access point, nothing unusual.".to_string())
    );
}

#[tokio::test]
async fn test_hung_llm_does_not_block_scoring() {
    let index = Arc::new(MemoryIndex::new());
    let store_dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(store_dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    for n in 0..3 {
        source.push(device(&format!("aa:bb:cc:00:01:{:02x}", n), "Office", 5_000 + n));
    }
    sync_loop(source, index.clone(), &store, 4_000).poll_once().await.unwrap();

    let scanner = EnrichmentScanner::new(
        index.clone(),
        Some(Arc::new(ThresholdScorer)),
        Some(Arc::new(HungGenerator)),
        settings(),
        SharedStatus::new(),
    );

    let reports = tokio::time::timeout(Duration::from_secs(5), scanner.tick())
        .await
        .expect("scan must finish despite the hung generator");

    let score = reports[0].as_ref().unwrap();
    assert_eq!(score.field, EnrichField::AnomalyScore);
    assert_eq!(score.enriched, 3);

    let summary = reports[1].as_ref().unwrap();
    assert_eq!(summary.failed, 3);

    let updates = index.updates();
    assert!(updates.iter().all(|(_, field)| *field == "anomaly_score"));
    for id in index.ids() {
        assert!(index.get(&id).unwrap().context.is_none());
    }
}

#[tokio::test]
async fn test_find_missing_sees_only_unenriched() {
    let index = Arc::new(MemoryIndex::new());
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path().join("cursor.json"));
    let source = Arc::new(Telemetry::default());
    source.push(device("aa:bb:cc:00:02:01", "A", 6_000));
    source.push(device("aa:bb:cc:00:02:02", "B", 6_001));
    sync_loop(source, index.clone(), &store, 5_000).poll_once().await.unwrap();

    let scanner = EnrichmentScanner::new(index.clone(), None, Some(Arc::new(CannedGenerator)), settings(), SharedStatus::new());
    scanner.scan_for_missing(EnrichField::ContextSummary).await.unwrap();

    let query = wids_pipeline::logic::index::MissingFieldQuery {
        field: "context.summary",
        time_window: None,
        after: None,
        size: 10,
    };
    assert!(index.find_missing(&query).await.unwrap().docs.is_empty());

    let query = wids_pipeline::logic::index::MissingFieldQuery {
        field: "anomaly_score",
        ..query
    };
    assert_eq!(index.find_missing(&query).await.unwrap().docs.len(), 2);
}
