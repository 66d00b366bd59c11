//! Inference Engine - ONNX Runtime Integration
//!
//! Runs the offline-trained Isolation Forest (skl2onnx export).
//! Model outputs:
//! - `label`: int64, 1 = normal, -1 = anomalous
//! - `scores`: float, decision function (lower = more anomalous)

use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use thiserror::Error;

use super::metadata::{MetadataError, ModelMetadata};
use crate::logic::features::{AnomalyLabel, FeatureVector, FEATURE_COUNT};

const LABEL_OUTPUT: &str = "label";
const SCORES_OUTPUT: &str = "scores";

// ============================================================================
// ERRORS
// ============================================================================

/// Failure to bring a model up
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(PathBuf),

    #[error("onnx runtime: {0}")]
    Runtime(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("model has no `{0}` output")]
    MissingOutput(&'static str),
}

/// Failure of a single scoring call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
}

// ============================================================================
// SCORER TRAIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
    pub score: f64,
    pub label: AnomalyLabel,
}

/// Synchronous anomaly scorer; callers move it onto the blocking pool
pub trait AnomalyScorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<AnomalyVerdict, ScoreError>;

    /// Identifier written to `anomaly_model`
    fn model_id(&self) -> &str;
}

// ============================================================================
// ONNX IMPLEMENTATION
// ============================================================================

pub struct OnnxScorer {
    session: Mutex<Session>,
    metadata: ModelMetadata,
    path: PathBuf,
}

impl OnnxScorer {
    /// Load the ONNX model and its validated metadata sidecar
    pub fn load(model_path: &Path, metadata_path: &Path) -> Result<Self, ModelError> {
        tracing::info!("Loading ONNX model from: {}", model_path.display());

        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        let metadata = ModelMetadata::load(metadata_path)?;

        let session = Session::builder()
            .map_err(|e| ModelError::Runtime(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Runtime(format!("optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| ModelError::Runtime(format!("load: {}", e)))?;

        for name in [LABEL_OUTPUT, SCORES_OUTPUT] {
            if !session.outputs.iter().any(|o| o.name == name) {
                return Err(ModelError::MissingOutput(name));
            }
        }

        tracing::info!(model_id = %metadata.model_id, "ONNX model loaded successfully");

        Ok(Self {
            session: Mutex::new(session),
            metadata,
            path: model_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl AnomalyScorer for OnnxScorer {
    fn score(&self, features: &FeatureVector) -> Result<AnomalyVerdict, ScoreError> {
        let input = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), features.as_slice().to_vec())
            .map_err(|e| ScoreError::Inference(format!("array: {}", e)))?;
        let tensor = Value::from_array(input).map_err(|e| ScoreError::Inference(format!("tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| ScoreError::Inference(e.to_string()))?;

        let label = outputs
            .get(LABEL_OUTPUT)
            .ok_or_else(|| ScoreError::InvalidOutput("missing label".into()))?
            .try_extract_tensor::<i64>()
            .map_err(|e| ScoreError::InvalidOutput(format!("label: {}", e)))?
            .1
            .first()
            .copied()
            .ok_or_else(|| ScoreError::InvalidOutput("empty label".into()))?;

        let score = outputs
            .get(SCORES_OUTPUT)
            .ok_or_else(|| ScoreError::InvalidOutput("missing scores".into()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| ScoreError::InvalidOutput(format!("scores: {}", e)))?
            .1
            .first()
            .copied()
            .ok_or_else(|| ScoreError::InvalidOutput("empty scores".into()))?;

        verdict(label, score)
    }

    fn model_id(&self) -> &str {
        &self.metadata.model_id
    }
}

/// Map raw Isolation Forest outputs to a verdict
pub fn verdict(label: i64, score: f32) -> Result<AnomalyVerdict, ScoreError> {
    if !score.is_finite() {
        return Err(ScoreError::InvalidOutput(format!("non-finite score {}", score)));
    }
    let label = match label {
        1 => AnomalyLabel::Normal,
        -1 => AnomalyLabel::Anomalous,
        other => return Err(ScoreError::InvalidOutput(format!("label {}", other))),
    };
    Ok(AnomalyVerdict {
        score: score as f64,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_mapping() {
        assert_eq!(verdict(1, 0.1).unwrap().label, AnomalyLabel::Normal);
        let v = verdict(-1, -0.25).unwrap();
        assert_eq!(v.label, AnomalyLabel::Anomalous);
        assert_eq!(v.score, -0.25);
    }

    #[test]
    fn test_verdict_rejects_garbage() {
        assert!(verdict(0, 0.1).is_err());
        assert!(verdict(1, f32::NAN).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxScorer::load(&dir.path().join("none.onnx"), &dir.path().join("none.json"));
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }
}
