//! Feature Layout - model input columns
//!
//! The offline Isolation Forest job trains on exactly these document
//! fields, in this order. Any change to the list (new field, removed
//! field, reordering) bumps `FEATURE_VERSION`; the model metadata sidecar
//! carries version and hash, and a mismatching model is refused at load.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT
// ============================================================================

/// Feature document fields fed to the model, in vector order
pub const FEATURE_LAYOUT: &[&str] = &[
    "ssid_entropy", // 0: Shannon entropy of the SSID (bits/char)
    "rssi_mean",    // 1: Midpoint of min/max signal (dBm)
    "rssi_min",     // 2: Weakest observed signal (dBm)
    "rssi_max",     // 3: Strongest observed signal (dBm)
    "client_count", // 4: Associated clients
];

/// `FEATURE_LAYOUT.len()`, usable in array types
pub const FEATURE_COUNT: usize = 5;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 of the current layout
pub fn layout_hash() -> u32 {
    hash_feature_names(FEATURE_VERSION, FEATURE_LAYOUT)
}

/// CRC32 over version byte + NUL-terminated names; also used for model metadata
pub fn hash_feature_names<S: AsRef<str>>(version: u8, names: &[S]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[version]);
    for name in names {
        hasher.update(name.as_ref().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Layout header written at the top of training exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// LAYOUT VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "feature layout mismatch: expected v{expected_version} ({expected_hash:08x}), got v{actual_version} ({actual_hash:08x})"
)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

pub fn validate_layout(version: u8, hash: u32) -> Result<(), LayoutMismatchError> {
    if version == FEATURE_VERSION && hash == layout_hash() {
        Ok(())
    } else {
        Err(LayoutMismatchError {
            expected_version: FEATURE_VERSION,
            expected_hash: layout_hash(),
            actual_version: version,
            actual_hash: hash,
        })
    }
}
