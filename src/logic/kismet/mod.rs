//! Kismet telemetry source
//!
//! ## Structure
//! - `record`: Untyped device record + field selection
//! - `client`: REST client for `/devices/last-time/{ts}/devices.json`

pub mod client;
pub mod record;

use async_trait::async_trait;

use crate::error::DependencyError;

pub use client::KismetClient;
pub use record::RawDeviceRecord;

/// Anything that can hand out device records changed since a point in time
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Records whose `last_time` is at or after `since` (unix seconds)
    async fn fetch_since(&self, since: i64) -> Result<Vec<RawDeviceRecord>, DependencyError>;
}
