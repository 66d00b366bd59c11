use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::{ExportHeader, TrainingRecord, REQUIRED_FIELDS};
use crate::error::PipelineResult;
use crate::logic::index::SearchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
}

/// Write the header and records as JSONL
pub fn write_jsonl<W: Write>(mut out: W, header: &ExportHeader, records: &[TrainingRecord]) -> PipelineResult<()> {
    serde_json::to_writer(&mut out, header)?;
    out.write_all(b"\n")?;
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Export up to `limit` documents carrying the required features, oldest first
pub async fn export_training(
    index: &dyn SearchIndex,
    target: &Path,
    limit: usize,
) -> PipelineResult<ExportSummary> {
    let docs = index.find_with_fields(&REQUIRED_FIELDS, limit).await?;
    let records: Vec<TrainingRecord> = docs.iter().map(TrainingRecord::from).collect();

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(target)?;
    write_jsonl(BufWriter::new(file), &ExportHeader::current(), &records)?;

    info!("Exported {} training records to {}", records.len(), target.display());
    Ok(ExportSummary { records: records.len() })
}
