//! Model metadata sidecar
//!
//! The training job writes `<model>.onnx.json` next to the ONNX export:
//!
//! ```json
//! { "model_id": "iforest-2024-05-01", "feature_version": 1,
//!   "features": ["ssid_entropy", "rssi_mean", "rssi_min", "rssi_max", "client_count"] }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::features::layout::{
    hash_feature_names, validate_layout, LayoutMismatchError, FEATURE_VERSION,
};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model was trained on {actual:?}, pipeline produces {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
        #[source]
        source: LayoutMismatchError,
    },

    #[error("layout hash {declared:08x} does not match feature list hash {computed:08x}")]
    HashMismatch { declared: u32, computed: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    #[serde(default = "default_version")]
    pub feature_version: u8,
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_hash: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
}

fn default_version() -> u8 {
    FEATURE_VERSION
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let data = fs::read(path)?;
        let meta: Self = serde_json::from_slice(&data)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Hash of the declared feature list
    pub fn computed_hash(&self) -> u32 {
        hash_feature_names(self.feature_version, &self.features)
    }

    /// Feature order and version must match the pipeline layout exactly
    pub fn validate(&self) -> Result<(), MetadataError> {
        let computed = self.computed_hash();
        if let Some(declared) = self.layout_hash {
            if declared != computed {
                return Err(MetadataError::HashMismatch { declared, computed });
            }
        }

        validate_layout(self.feature_version, computed).map_err(|source| {
            MetadataError::FeatureMismatch {
                expected: crate::logic::features::FEATURE_LAYOUT
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                actual: self.features.clone(),
                source,
            }
        })
    }
}
