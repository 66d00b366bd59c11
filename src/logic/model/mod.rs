//! Model Module - anomaly scoring
//!
//! Loads the offline-trained Isolation Forest once at startup.
//! A failed load disables the scoring pass only.

pub mod inference;
pub mod metadata;

use std::sync::Arc;

pub use inference::{verdict, AnomalyScorer, AnomalyVerdict, ModelError, OnnxScorer, ScoreError};
pub use metadata::{MetadataError, ModelMetadata};

use crate::config::ModelConfig;
use crate::error::FatalConfigError;

/// Build the production scorer from configuration
pub fn load_scorer(config: &ModelConfig) -> Result<Arc<dyn AnomalyScorer>, FatalConfigError> {
    let path = config
        .path
        .as_ref()
        .ok_or_else(|| FatalConfigError::Disabled("anomaly scoring", "MODEL_PATH is not set".into()))?;
    let metadata_path = config
        .resolved_metadata_path()
        .unwrap_or_else(|| path.with_extension("json"));

    let scorer = OnnxScorer::load(path, &metadata_path).map_err(|e| FatalConfigError::ModelLoad {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(scorer))
}
