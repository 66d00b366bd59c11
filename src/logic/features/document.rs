//! Feature Document - canonical index schema
//!
//! One document per observed device per identity slot. Identity fields
//! (`sensor.id`, `bssid`, `window_start`) never change after creation;
//! the document id is derived from them alone.
//!
//! Observation fields serialize absent values as explicit `null`.
//! Enrichment fields are skipped when unset so an ingest upsert never
//! clears a score or summary written earlier by the scanner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index field names used in queries and partial updates
pub mod fields {
    pub const TIMESTAMP: &str = "@timestamp";
    pub const LAST_SEEN: &str = "last_seen";
    pub const BSSID: &str = "bssid";
    pub const SENSOR_ID: &str = "sensor.id";
    pub const SSID_ENTROPY: &str = "ssid_entropy";
    pub const RSSI_MEAN: &str = "rssi_mean";
    pub const ANOMALY_SCORE: &str = "anomaly_score";
    pub const ANOMALY_LABEL: &str = "anomaly_label";
    pub const CONTEXT_SUMMARY: &str = "context.summary";
}

/// Which sensor produced the observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

/// Binary verdict of the anomaly model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::Normal => "normal",
            AnomalyLabel::Anomalous => "anomalous",
        }
    }
}

/// LLM-generated analyst context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub summary: String,
    pub summary_generated_at: DateTime<Utc>,
    pub summary_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    // === Identity ===
    pub sensor: SensorInfo,
    pub bssid: String,
    /// Start of the observation window (window identity mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,

    // === Observation ===
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub manuf: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub phyname: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub rssi_last: Option<i32>,
    #[serde(default)]
    pub rssi_min: Option<i32>,
    #[serde(default)]
    pub rssi_max: Option<i32>,
    #[serde(default)]
    pub client_count: Option<u32>,
    #[serde(default)]
    pub packets_total: Option<u64>,

    // === Derived ===
    #[serde(default)]
    pub rssi_mean: Option<f64>,
    #[serde(default)]
    pub ssid_entropy: Option<f64>,

    // === Enrichment (scanner-owned) ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_label: Option<AnomalyLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSummary>,
}

impl FeatureDocument {
    /// Document id, a pure function of the identity fields
    ///
    /// `{sensor}:{mac}` for the rolling latest slot,
    /// `{sensor}:{mac}:{window_start_unix}` for fixed windows.
    pub fn doc_id(&self) -> String {
        match self.window_start {
            None => format!("{}:{}", self.sensor.id, self.bssid),
            Some(start) => format!("{}:{}:{}", self.sensor.id, self.bssid, start.timestamp()),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.anomaly_score.is_some() && self.anomaly_label.is_some()
    }

    pub fn has_summary(&self) -> bool {
        self.context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> FeatureDocument {
        let seen = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        FeatureDocument {
            timestamp: seen,
            sensor: SensorInfo { id: "lab-1".into(), site: None },
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            window_start: None,
            ssid: None,
            manuf: Some("Acme".into()),
            channel: None,
            phyname: None,
            device_type: None,
            first_seen: None,
            last_seen: seen,
            rssi_last: Some(-60),
            rssi_min: None,
            rssi_max: None,
            client_count: None,
            packets_total: None,
            rssi_mean: None,
            ssid_entropy: None,
            anomaly_score: None,
            anomaly_label: None,
            anomaly_model: None,
            context: None,
        }
    }

    #[test]
    fn test_absent_observation_is_explicit_null() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("ssid").unwrap().is_null());
        assert_eq!(json["manuf"], "Acme");
    }

    #[test]
    fn test_unset_enrichment_is_not_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("anomaly_score").is_none());
        assert!(json.get("anomaly_label").is_none());
        assert!(json.get("context").is_none());
        assert!(json.get("window_start").is_none());
    }

    #[test]
    fn test_doc_id_latest_and_window() {
        let mut doc = sample();
        assert_eq!(doc.doc_id(), "lab-1:aa:bb:cc:dd:ee:ff");

        doc.window_start = Some(Utc.timestamp_opt(1_699_999_800, 0).unwrap());
        assert_eq!(doc.doc_id(), "lab-1:aa:bb:cc:dd:ee:ff:1699999800");
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_value(AnomalyLabel::Anomalous).unwrap(), "anomalous");
    }
}
