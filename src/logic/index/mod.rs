//! Search Index - document store seam
//!
//! The sync loop and the enrichment scanner only ever meet here.
//! `ElasticIndex` talks to Elasticsearch; `MemoryIndex` backs tests and
//! dry runs with the same merge semantics.

pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::DependencyError;
use crate::logic::features::{fields, AnomalyLabel, ContextSummary, FeatureDocument};

pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;

// ============================================================================
// SORT KEY
// ============================================================================

/// Stable scan order: `last_seen` asc, `bssid` asc, `sensor.id` asc
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub last_seen_ms: i64,
    pub bssid: String,
    pub sensor_id: String,
}

impl SortKey {
    pub fn of(doc: &FeatureDocument) -> Self {
        Self {
            last_seen_ms: doc.last_seen.timestamp_millis(),
            bssid: doc.bssid.clone(),
            sensor_id: doc.sensor.id.clone(),
        }
    }

    /// `search_after` array
    pub fn to_json(&self) -> Value {
        json!([self.last_seen_ms, self.bssid, self.sensor_id])
    }

    /// Parse a hit's `sort` array
    pub fn from_json(value: &Value) -> Option<Self> {
        let arr = value.as_array()?;
        if arr.len() != 3 {
            return None;
        }
        Some(Self {
            last_seen_ms: arr[0].as_i64().or_else(|| arr[0].as_f64().map(|f| f as i64))?,
            bssid: arr[1].as_str()?.to_string(),
            sensor_id: arr[2].as_str()?.to_string(),
        })
    }

    /// Sort clause matching this key's order
    pub fn sort_clause() -> Value {
        json!([
            { (fields::LAST_SEEN): { "order": "asc" } },
            { (fields::BSSID): { "order": "asc" } },
            { (fields::SENSOR_ID): { "order": "asc" } }
        ])
    }
}

// ============================================================================
// QUERIES & RESULTS
// ============================================================================

/// Page of documents lacking one field
#[derive(Debug, Clone)]
pub struct MissingFieldQuery {
    /// Dotted field path that must be absent
    pub field: &'static str,
    /// Optional date-math lower bound on `@timestamp`
    pub time_window: Option<String>,
    /// Resume strictly after this position
    pub after: Option<SortKey>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub sort: SortKey,
    pub doc: FeatureDocument,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub docs: Vec<StoredDocument>,
    /// Raw hit count, including hits whose source could not be decoded
    pub hits: usize,
    /// Sort position of the last hit
    pub last_sort: Option<SortKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

/// Per-item result of a bulk upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub written: usize,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// FIELD PATCHES
// ============================================================================

/// Field-scoped partial update written by the enrichment scanner
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch {
    Anomaly {
        score: f64,
        label: AnomalyLabel,
        model: String,
    },
    Context(ContextSummary),
}

impl FieldPatch {
    pub fn context(summary: String, model: String) -> Self {
        FieldPatch::Context(ContextSummary {
            summary,
            summary_generated_at: Utc::now(),
            summary_model: model,
        })
    }

    /// The enrichment field this patch fills
    pub fn field(&self) -> &'static str {
        match self {
            FieldPatch::Anomaly { .. } => fields::ANOMALY_SCORE,
            FieldPatch::Context(_) => fields::CONTEXT_SUMMARY,
        }
    }

    /// Partial document; touches nothing outside its own fields
    pub fn to_partial(&self) -> Value {
        match self {
            FieldPatch::Anomaly { score, label, model } => json!({
                "anomaly_score": score,
                "anomaly_label": label,
                "anomaly_model": model,
            }),
            FieldPatch::Context(ctx) => json!({ "context": ctx }),
        }
    }
}

// ============================================================================
// TRAIT
// ============================================================================

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upsert documents keyed on `doc_id()`, merging into existing ones
    async fn upsert_batch(&self, docs: &[FeatureDocument]) -> Result<BulkOutcome, DependencyError>;

    /// One page of documents where `query.field` is absent, in `SortKey` order
    async fn find_missing(&self, query: &MissingFieldQuery) -> Result<SearchPage, DependencyError>;

    /// Write an enrichment patch onto an existing document
    async fn update_fields(&self, id: &str, patch: &FieldPatch) -> Result<(), DependencyError>;

    /// Documents carrying all of `required`, oldest first
    async fn find_with_fields(
        &self,
        required: &[&str],
        limit: usize,
    ) -> Result<Vec<StoredDocument>, DependencyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_json() {
        let key = SortKey {
            last_seen_ms: 1_700_000_000_000,
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            sensor_id: "s1".into(),
        };
        assert_eq!(SortKey::from_json(&key.to_json()), Some(key));
        assert_eq!(SortKey::from_json(&json!([1, "x"])), None);
    }

    #[test]
    fn test_sort_key_order() {
        let a = SortKey { last_seen_ms: 1, bssid: "b".into(), sensor_id: "a".into() };
        let b = SortKey { last_seen_ms: 1, bssid: "b".into(), sensor_id: "b".into() };
        let c = SortKey { last_seen_ms: 2, bssid: "a".into(), sensor_id: "a".into() };
        assert!(a < b && b < c);
    }

    #[test]
    fn test_anomaly_patch_is_field_scoped() {
        let patch = FieldPatch::Anomaly {
            score: -0.12,
            label: AnomalyLabel::Anomalous,
            model: "iforest".into(),
        };
        let partial = patch.to_partial();
        let keys: Vec<&String> = partial.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert!(partial.get("context").is_none());
        assert_eq!(partial["anomaly_label"], "anomalous");
        assert_eq!(patch.field(), "anomaly_score");
    }

    #[test]
    fn test_context_patch_is_field_scoped() {
        let patch = FieldPatch::context("benign AP".into(), "llama3.1".into());
        let partial = patch.to_partial();
        assert_eq!(partial.as_object().unwrap().len(), 1);
        assert_eq!(partial["context"]["summary"], "benign AP");
        assert_eq!(patch.field(), "context.summary");
    }
}
