//! Feature Normalizer
//!
//! Raw Kismet record → canonical `FeatureDocument`. Pure: no I/O, no clock.
//! Only the device identifier and `last_time` are required; every other
//! field maps to `None` when absent or unusable, never to a sentinel.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::document::{FeatureDocument, SensorInfo};
use super::entropy::shannon_entropy;
use crate::error::MalformedRecordError;
use crate::logic::kismet::record::{keys, RawDeviceRecord};

static MAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(?:[0-9a-f]{2}(?::[0-9a-f]{2}){5}|[0-9a-f]{2}(?:-[0-9a-f]{2}){5})$").expect("valid MAC regex")
});

/// How feature documents are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// One rolling document per (sensor, device), refreshed in place
    Latest,
    /// One document per (sensor, device, window of `secs` seconds)
    Window { secs: u64 },
}

impl Default for IdentityMode {
    fn default() -> Self {
        IdentityMode::Latest
    }
}

/// Process-level inputs the normalizer needs besides the record
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub sensor: SensorInfo,
    pub identity: IdentityMode,
}

/// Canonical lowercase colon-separated MAC, or `None` if not MAC-like
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !MAC_RE.is_match(raw) {
        return None;
    }
    Some(raw.to_ascii_lowercase().replace('-', ":"))
}

/// Positive unix seconds that fit a `DateTime`
pub fn unix_time(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Kismet reports 0 when it has no signal reading
fn signal(record: &RawDeviceRecord, key: &str) -> Option<i32> {
    record
        .i64_field(key)
        .filter(|v| *v != 0)
        .and_then(|v| i32::try_from(v).ok())
}

fn non_negative<T: TryFrom<i64>>(record: &RawDeviceRecord, key: &str) -> Option<T> {
    record
        .i64_field(key)
        .filter(|v| *v >= 0)
        .and_then(|v| T::try_from(v).ok())
}

/// Normalize one raw telemetry record
pub fn normalize(
    record: &RawDeviceRecord,
    ctx: &NormalizeContext,
) -> Result<FeatureDocument, MalformedRecordError> {
    let raw_mac = record
        .str_field(keys::MAC)
        .ok_or_else(|| MalformedRecordError::new("missing device identifier", record.hint()))?;

    let bssid = normalize_mac(raw_mac).ok_or_else(|| {
        MalformedRecordError::new(format!("device identifier `{}` is not a MAC address", raw_mac), record.hint())
    })?;

    let last_seen = record
        .last_time()
        .and_then(unix_time)
        .ok_or_else(|| MalformedRecordError::new("missing or invalid last_time", bssid.clone()))?;

    let first_seen = record
        .i64_field(keys::FIRST_TIME)
        .and_then(unix_time)
        .filter(|t| *t <= last_seen);

    let window_start = match ctx.identity {
        IdentityMode::Latest => None,
        IdentityMode::Window { secs } => {
            let secs = secs.max(1) as i64;
            let ts = last_seen.timestamp();
            unix_time(ts - ts.rem_euclid(secs)).or(Some(last_seen))
        }
    };

    let ssid = record.str_field(keys::SSID).map(str::to_string);
    let ssid_entropy = ssid.as_deref().map(shannon_entropy);

    let rssi_min = signal(record, keys::SIGNAL_MIN);
    let rssi_max = signal(record, keys::SIGNAL_MAX);
    let rssi_mean = match (rssi_min, rssi_max) {
        (Some(lo), Some(hi)) => Some((lo as f64 + hi as f64) / 2.0),
        _ => None,
    };

    Ok(FeatureDocument {
        timestamp: last_seen,
        sensor: ctx.sensor.clone(),
        bssid,
        window_start,
        ssid,
        manuf: record
            .str_field(keys::MANUF)
            .filter(|m| !m.eq_ignore_ascii_case("unknown"))
            .map(str::to_string),
        channel: record.str_field(keys::CHANNEL).map(str::to_string),
        phyname: record.str_field(keys::PHYNAME).map(str::to_string),
        device_type: record.str_field(keys::DEVICE_TYPE).map(str::to_string),
        first_seen,
        last_seen,
        rssi_last: signal(record, keys::SIGNAL_LAST),
        rssi_min,
        rssi_max,
        client_count: non_negative(record, keys::CLIENT_COUNT),
        packets_total: non_negative(record, keys::PACKETS_TOTAL),
        rssi_mean,
        ssid_entropy,
        anomaly_score: None,
        anomaly_label: None,
        anomaly_model: None,
        context: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NormalizeContext {
        NormalizeContext {
            sensor: SensorInfo { id: "lab-1".into(), site: Some("bench".into()) },
            identity: IdentityMode::Latest,
        }
    }

    #[test]
    fn test_full_record() {
        let rec = RawDeviceRecord::from(json!({
            "macaddr": "AA-BB-CC-DD-EE-01",
            "ssid": "CoffeeShop",
            "manuf": "Ubiquiti",
            "channel": "6",
            "phyname": "IEEE802.11",
            "first_time": 1_700_000_000,
            "last_time": 1_700_000_100,
            "signal_last": -55,
            "signal_min": -70,
            "signal_max": -50,
            "client_count": 3
        }));

        let doc = normalize(&rec, &ctx()).unwrap();
        assert_eq!(doc.bssid, "aa:bb:cc:dd:ee:01");
        assert_eq!(doc.ssid.as_deref(), Some("CoffeeShop"));
        assert_eq!(doc.rssi_mean, Some(-60.0));
        assert_eq!(doc.client_count, Some(3));
        assert_eq!(doc.last_seen.timestamp(), 1_700_000_100);
        assert_eq!(doc.timestamp, doc.last_seen);
        assert!(doc.ssid_entropy.unwrap() > 0.0);
        assert_eq!(doc.sensor.site.as_deref(), Some("bench"));
    }

    #[test]
    fn test_missing_mac_is_malformed() {
        let rec = RawDeviceRecord::from(json!({ "last_time": 1_700_000_100 }));
        let err = normalize(&rec, &ctx()).unwrap_err();
        assert!(err.reason.contains("missing device identifier"));
    }

    #[test]
    fn test_garbage_mac_is_malformed() {
        let rec = RawDeviceRecord::from(json!({ "macaddr": "not-a-mac", "last_time": 1 }));
        assert!(normalize(&rec, &ctx()).is_err());
    }

    #[test]
    fn test_missing_last_time_is_malformed() {
        let rec = RawDeviceRecord::from(json!({ "macaddr": "aa:bb:cc:dd:ee:ff", "last_time": 0 }));
        assert!(normalize(&rec, &ctx()).is_err());
    }

    #[test]
    fn test_absent_fields_are_none_not_sentinels() {
        let rec = RawDeviceRecord::from(json!({
            "macaddr": "aa:bb:cc:dd:ee:ff",
            "last_time": 1_700_000_100,
            "ssid": "",
            "signal_last": 0,
            "first_time": 0
        }));

        let doc = normalize(&rec, &ctx()).unwrap();
        assert_eq!(doc.ssid, None);
        assert_eq!(doc.ssid_entropy, None);
        assert_eq!(doc.rssi_last, None);
        assert_eq!(doc.rssi_mean, None);
        assert_eq!(doc.first_seen, None);
        assert_eq!(doc.client_count, None);
    }

    #[test]
    fn test_window_identity_floors_last_seen() {
        let ctx = NormalizeContext {
            identity: IdentityMode::Window { secs: 300 },
            ..ctx()
        };
        let rec = RawDeviceRecord::from(json!({ "macaddr": "aa:bb:cc:dd:ee:ff", "last_time": 1_700_000_123 }));
        let doc = normalize(&rec, &ctx).unwrap();
        assert_eq!(doc.window_start.unwrap().timestamp(), 1_700_000_100);
        assert!(doc.doc_id().ends_with(":1700000100"));
    }

    #[test]
    fn test_deterministic() {
        let rec = RawDeviceRecord::from(json!({
            "macaddr": "aa:bb:cc:dd:ee:ff", "last_time": 1_700_000_100, "ssid": "x1y2"
        }));
        assert_eq!(normalize(&rec, &ctx()).unwrap(), normalize(&rec, &ctx()).unwrap());
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee"), None);
        assert_eq!(normalize_mac("aa:bb-cc:dd-ee:ff"), None);
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee:ff"), None);
    }
}
