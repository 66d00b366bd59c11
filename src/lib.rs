//! WIDS Feature Pipeline
//!
//! Polls Kismet for device records, normalizes them into one canonical
//! document per device, syncs deltas into Elasticsearch and backfills
//! `anomaly_score` (ONNX Isolation Forest) and `context.summary` (Ollama).
//!
//! ```text
//!  Kismet ──poll──▶ sync ──bulk upsert──▶ Elasticsearch ◀──partial update── enrich
//!                    │                                                      │
//!               cursor file                                      scorer / Ollama
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod logic;
pub mod pipeline;
pub mod status;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
