//! Enrichment Scanner
//!
//! Each scan fetches one page of documents missing a field, resuming after
//! the position where the previous scan of that field stopped. A short page
//! wraps the position back to the start, so repeated scans sweep the whole
//! backlog and a document that keeps failing never pins the scan in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::EnrichField;
use crate::config::{EnrichConfig, OllamaConfig};
use crate::constants;
use crate::error::{Dependency, DependencyError, PipelineResult};
use crate::logic::context::{build_prompt, ContextGenerator, LlmError};
use crate::logic::features::FeatureVector;
use crate::logic::index::{FieldPatch, MissingFieldQuery, SearchIndex, SortKey, StoredDocument};
use crate::logic::model::{AnomalyScorer, ScoreError};
use crate::status::SharedStatus;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub time_window: Option<String>,
    pub score_timeout: Duration,
    pub llm_timeout: Duration,
}

impl ScanSettings {
    pub fn from_config(enrich: &EnrichConfig, ollama: &OllamaConfig) -> Self {
        Self {
            batch_size: enrich.batch_size,
            concurrency: enrich.concurrency,
            time_window: enrich.time_window.clone(),
            score_timeout: Duration::from_millis(enrich.score_timeout_ms),
            llm_timeout: Duration::from_secs(ollama.timeout_secs),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_ENRICH_BATCH_SIZE,
            concurrency: constants::DEFAULT_ENRICH_CONCURRENCY,
            time_window: None,
            score_timeout: Duration::from_millis(constants::DEFAULT_SCORE_TIMEOUT_MS),
            llm_timeout: Duration::from_secs(constants::DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

/// Why one document was left unenriched
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("scoring failed: {0}")]
    Score(#[from] ScoreError),

    #[error("context generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("write-back failed: {0}")]
    WriteBack(#[from] DependencyError),
}

impl EnrichError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::Score(_) => "score_error",
            EnrichError::Llm(e) => e.kind(),
            EnrichError::Timeout(_) => "timeout",
            EnrichError::WriteBack(_) => "write_back",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed,
    /// A scan of the same field was still running
    Skipped,
    /// The field's dependency is not available in this process
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub field: EnrichField,
    pub outcome: ScanOutcome,
    /// Documents in the page
    pub examined: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Position went back to the start after this scan
    pub wrapped: bool,
}

impl ScanReport {
    fn new(field: EnrichField, outcome: ScanOutcome) -> Self {
        Self {
            field,
            outcome,
            examined: 0,
            enriched: 0,
            failed: 0,
            wrapped: false,
        }
    }
}

/// Per-field single-flight guard holding the resume position
#[derive(Default)]
struct Lane {
    position: Mutex<Option<SortKey>>,
}

pub struct EnrichmentScanner {
    index: Arc<dyn SearchIndex>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    generator: Option<Arc<dyn ContextGenerator>>,
    settings: ScanSettings,
    score_lane: Lane,
    context_lane: Lane,
    status: SharedStatus,
}

impl EnrichmentScanner {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        scorer: Option<Arc<dyn AnomalyScorer>>,
        generator: Option<Arc<dyn ContextGenerator>>,
        settings: ScanSettings,
        status: SharedStatus,
    ) -> Self {
        status.update_enrich(|e| {
            e.scorer_loaded = scorer.is_some();
            e.scorer_model = scorer.as_ref().map(|s| s.model_id().to_string());
            e.context_enabled = generator.is_some();
        });
        Self {
            index,
            scorer,
            generator,
            settings,
            score_lane: Lane::default(),
            context_lane: Lane::default(),
            status,
        }
    }

    fn lane(&self, field: EnrichField) -> &Lane {
        match field {
            EnrichField::AnomalyScore => &self.score_lane,
            EnrichField::ContextSummary => &self.context_lane,
        }
    }

    fn enabled(&self, field: EnrichField) -> bool {
        match field {
            EnrichField::AnomalyScore => self.scorer.is_some(),
            EnrichField::ContextSummary => self.generator.is_some(),
        }
    }

    /// Scoring pass, then summary pass
    pub async fn tick(&self) -> Vec<PipelineResult<ScanReport>> {
        let mut reports = Vec::with_capacity(EnrichField::ALL.len());
        for field in EnrichField::ALL {
            reports.push(self.scan_for_missing(field).await);
        }
        reports
    }

    pub async fn scan_for_missing(&self, field: EnrichField) -> PipelineResult<ScanReport> {
        if !self.enabled(field) {
            return Ok(ScanReport::new(field, ScanOutcome::Disabled));
        }

        let Ok(mut position) = self.lane(field).position.try_lock() else {
            debug!(field = %field, "scan still running, skipping");
            self.status.update_enrich(|e| e.scans_skipped += 1);
            return Ok(ScanReport::new(field, ScanOutcome::Skipped));
        };

        let query = MissingFieldQuery {
            field: field.as_str(),
            time_window: self.settings.time_window.clone(),
            after: position.clone(),
            size: self.settings.batch_size.max(1),
        };

        let page = match self.index.find_missing(&query).await {
            Ok(page) => page,
            Err(e) => {
                warn!(field = %field, kind = e.kind(), error = %e, "missing-field query failed");
                self.status.update_enrich(|s| s.last_error = Some(e.to_string()));
                return Err(e.into());
            }
        };

        let mut report = ScanReport::new(field, ScanOutcome::Completed);
        report.examined = page.docs.len();
        if page.hits < query.size {
            *position = None;
            report.wrapped = true;
        } else {
            *position = page.last_sort.clone();
        }

        let results: Vec<Result<(), (String, EnrichError)>> = stream::iter(page.docs)
            .map(|doc| self.enrich_one(field, doc))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut last_error = None;
        for result in results {
            match result {
                Ok(()) => report.enriched += 1,
                Err((doc_id, e)) => {
                    report.failed += 1;
                    warn!(doc_id = %doc_id, field = %field, kind = e.kind(), error = %e, "enrichment failed, document stays pending");
                    last_error = Some(e.to_string());
                }
            }
        }

        self.status.update_enrich(|s| {
            s.scans += 1;
            s.last_scan_at = Some(Utc::now());
            s.failed += report.failed as u64;
            match field {
                EnrichField::AnomalyScore => s.scored += report.enriched as u64,
                EnrichField::ContextSummary => s.summarized += report.enriched as u64,
            }
            if last_error.is_some() {
                s.last_error = last_error;
            }
        });

        if report.examined > 0 {
            info!(
                field = %field,
                examined = report.examined,
                enriched = report.enriched,
                failed = report.failed,
                wrapped = report.wrapped,
                "enrichment scan finished"
            );
        }
        Ok(report)
    }

    async fn enrich_one(&self, field: EnrichField, stored: StoredDocument) -> Result<(), (String, EnrichError)> {
        let patch = match field {
            EnrichField::AnomalyScore => self.score(&stored).await,
            EnrichField::ContextSummary => self.summarize(&stored).await,
        };

        let result = match patch {
            Ok(patch) => self
                .index
                .update_fields(&stored.id, &patch)
                .await
                .map_err(EnrichError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(doc_id = %stored.id, field = %field, "document enriched");
                Ok(())
            }
            Err(e) => Err((stored.id, e)),
        }
    }

    async fn score(&self, stored: &StoredDocument) -> Result<FieldPatch, EnrichError> {
        let scorer = self
            .scorer
            .clone()
            .ok_or_else(|| ScoreError::Inference("no scorer loaded".into()))?;
        let model = scorer.model_id().to_string();
        let vector = FeatureVector::from_document(&stored.doc);
        let budget = self.settings.score_timeout;

        let task = tokio::task::spawn_blocking(move || scorer.score(&vector));
        let verdict = match timeout(budget, task).await {
            Err(_) => return Err(EnrichError::Timeout(budget)),
            Ok(Err(join)) => return Err(ScoreError::Inference(join.to_string()).into()),
            Ok(Ok(result)) => result?,
        };

        Ok(FieldPatch::Anomaly {
            score: verdict.score,
            label: verdict.label,
            model,
        })
    }

    async fn summarize(&self, stored: &StoredDocument) -> Result<FieldPatch, EnrichError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| LlmError::ModelNotFound("no context generator configured".into()))?;
        let prompt = build_prompt(&stored.doc);
        let budget = self.settings.llm_timeout;

        let text = timeout(budget, generator.generate(&prompt))
            .await
            .map_err(|_| EnrichError::Timeout(budget))??;
        let text = text.trim();
        if text.is_empty() {
            let empty = DependencyError::invalid(Dependency::ContextGenerator, "empty response content");
            return Err(LlmError::from(empty).into());
        }

        Ok(FieldPatch::context(text.to_string(), generator.model_name().to_string()))
    }
}
