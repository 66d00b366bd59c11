//! Enrichment Module - backfill of derived fields
//!
//! ## Structure
//! - `scanner`: Missing-field scans with bounded fan-out
//!
//! Two fields are backfilled independently: `anomaly_score` (with its
//! label and model id) from the anomaly scorer, and `context.summary`
//! from the LLM.

pub mod scanner;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::logic::features::fields;

pub use scanner::{EnrichError, EnrichmentScanner, ScanOutcome, ScanReport, ScanSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnrichField {
    #[serde(rename = "anomaly_score")]
    AnomalyScore,
    #[serde(rename = "context.summary")]
    ContextSummary,
}

impl EnrichField {
    pub const ALL: [EnrichField; 2] = [EnrichField::AnomalyScore, EnrichField::ContextSummary];

    /// Index field whose absence marks a document as pending
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichField::AnomalyScore => fields::ANOMALY_SCORE,
            EnrichField::ContextSummary => fields::CONTEXT_SUMMARY,
        }
    }
}

impl fmt::Display for EnrichField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown enrichment field `{0}` (expected `anomaly_score` or `context.summary`)")]
pub struct UnknownFieldError(pub String);

impl FromStr for EnrichField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "anomaly_score" => Ok(EnrichField::AnomalyScore),
            "context.summary" => Ok(EnrichField::ContextSummary),
            other => Err(UnknownFieldError(other.to_string())),
        }
    }
}
