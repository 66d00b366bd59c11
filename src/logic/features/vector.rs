//! Feature Vector
//!
//! Fixed-size model input extracted from a feature document, ordered by
//! `FEATURE_LAYOUT`. Missing values become 0.0, same as the training job.

use serde::{Deserialize, Serialize};

use super::document::FeatureDocument;
use super::layout::{layout_hash, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_document(doc: &FeatureDocument) -> Self {
        let mut values = [0.0f32; FEATURE_COUNT];
        for (i, name) in FEATURE_LAYOUT.iter().enumerate() {
            values[i] = feature_value(doc, name).unwrap_or(0.0) as f32;
        }
        Self { values }
    }

    /// Number of layout features the document actually carries
    pub fn present_count(doc: &FeatureDocument) -> usize {
        FEATURE_LAYOUT
            .iter()
            .filter(|name| feature_value(doc, name).is_some())
            .count()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn version(&self) -> u8 {
        FEATURE_VERSION
    }

    pub fn layout_hash(&self) -> u32 {
        layout_hash()
    }
}

fn feature_value(doc: &FeatureDocument, name: &str) -> Option<f64> {
    match name {
        "ssid_entropy" => doc.ssid_entropy,
        "rssi_mean" => doc.rssi_mean,
        "rssi_min" => doc.rssi_min.map(f64::from),
        "rssi_max" => doc.rssi_max.map(f64::from),
        "client_count" => doc.client_count.map(f64::from),
        _ => None,
    }
    .filter(|v| v.is_finite())
}
