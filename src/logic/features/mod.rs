//! Features Module - telemetry to canonical documents
//!
//! ## Structure
//! - `layout`: Model input layout (version + hash)
//! - `document`: Canonical index document
//! - `entropy`: SSID Shannon entropy
//! - `normalize`: Raw Kismet record → `FeatureDocument`
//! - `vector`: `FeatureDocument` → model input

pub mod document;
pub mod entropy;
pub mod layout;
pub mod normalize;
pub mod vector;

pub use document::{fields, AnomalyLabel, ContextSummary, FeatureDocument, SensorInfo};
pub use layout::{
    layout_hash, validate_layout, LayoutInfo, LayoutMismatchError, FEATURE_COUNT, FEATURE_LAYOUT,
    FEATURE_VERSION,
};
pub use normalize::{normalize, normalize_mac, unix_time, IdentityMode, NormalizeContext};
pub use vector::FeatureVector;

#[cfg(test)]
mod tests;
