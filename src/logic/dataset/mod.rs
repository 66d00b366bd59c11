//! Dataset Module - training data export
//!
//! Dumps the feature vectors of indexed documents as JSONL for the
//! offline Isolation Forest job. The first line is the layout header,
//! every following line one `TrainingRecord`.

pub mod export;
pub mod record;

pub use export::{export_training, write_jsonl, ExportSummary};
pub use record::{ExportHeader, TrainingRecord};

/// Fields a document must carry to be exported
pub const REQUIRED_FIELDS: [&str; 2] = [
    crate::logic::features::fields::SSID_ENTROPY,
    crate::logic::features::fields::RSSI_MEAN,
];
