use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::features::{FeatureVector, LayoutInfo};
use crate::logic::index::StoredDocument;

/// First line of an export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportHeader {
    pub layout: LayoutInfo,
    pub exported_at: DateTime<Utc>,
}

impl ExportHeader {
    pub fn current() -> Self {
        Self {
            layout: LayoutInfo::current(),
            exported_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub doc_id: String,
    pub last_seen: DateTime<Utc>,

    // Feature contract
    pub feature_version: u8,
    pub layout_hash: u32,
    pub features: Vec<f32>,
}

impl From<&StoredDocument> for TrainingRecord {
    fn from(stored: &StoredDocument) -> Self {
        let vector = FeatureVector::from_document(&stored.doc);
        Self {
            doc_id: stored.id.clone(),
            last_seen: stored.doc.last_seen,
            feature_version: vector.version(),
            layout_hash: vector.layout_hash(),
            features: vector.as_slice().to_vec(),
        }
    }
}
