//! Pipeline logic
//!
//! ## Structure
//! - `features`: Normalization into the canonical document
//! - `kismet`: Telemetry source
//! - `index`: Document store (Elasticsearch, in-memory)
//! - `sync`: Cursor-based delta sync
//! - `model`: Anomaly scorer
//! - `context`: LLM summaries
//! - `enrich`: Missing-field backfill
//! - `dataset`: Training data export
//! - `retry`, `scheduler`: Shared plumbing

pub mod context;
pub mod dataset;
pub mod enrich;
pub mod features;
pub mod index;
pub mod kismet;
pub mod model;
pub mod retry;
pub mod scheduler;
pub mod sync;
