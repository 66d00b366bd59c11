//! Raw Kismet device record
//!
//! Kismet is asked to return only the fields below, renamed to flat keys.
//! Records stay untyped JSON until the normalizer looks at them, so one
//! odd record cannot fail the whole response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `(kismet field path, flat name)` pairs requested from Kismet
pub const KISMET_FIELDS: &[(&str, &str)] = &[
    ("kismet.device.base.macaddr", keys::MAC),
    (
        "dot11.device/dot11.device.last_beaconed_ssid_record/dot11.advertisedssid.ssid",
        keys::SSID,
    ),
    ("kismet.device.base.manuf", keys::MANUF),
    ("kismet.device.base.channel", keys::CHANNEL),
    ("kismet.device.base.phyname", keys::PHYNAME),
    ("kismet.device.base.type", keys::DEVICE_TYPE),
    ("kismet.device.base.first_time", keys::FIRST_TIME),
    ("kismet.device.base.last_time", keys::LAST_TIME),
    ("kismet.device.base.signal/kismet.common.signal.last_signal", keys::SIGNAL_LAST),
    ("kismet.device.base.signal/kismet.common.signal.min_signal", keys::SIGNAL_MIN),
    ("kismet.device.base.signal/kismet.common.signal.max_signal", keys::SIGNAL_MAX),
    ("dot11.device/dot11.device.num_associated_clients", keys::CLIENT_COUNT),
    ("kismet.device.base.packets.total", keys::PACKETS_TOTAL),
];

/// Flat keys of a raw record
pub mod keys {
    pub const MAC: &str = "macaddr";
    pub const SSID: &str = "ssid";
    pub const MANUF: &str = "manuf";
    pub const CHANNEL: &str = "channel";
    pub const PHYNAME: &str = "phyname";
    pub const DEVICE_TYPE: &str = "device_type";
    pub const FIRST_TIME: &str = "first_time";
    pub const LAST_TIME: &str = "last_time";
    pub const SIGNAL_LAST: &str = "signal_last";
    pub const SIGNAL_MIN: &str = "signal_min";
    pub const SIGNAL_MAX: &str = "signal_max";
    pub const CLIENT_COUNT: &str = "client_count";
    pub const PACKETS_TOTAL: &str = "packets_total";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDeviceRecord(pub Map<String, Value>);

impl RawDeviceRecord {
    /// Wrap a JSON value; non-objects become an empty record
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Non-empty string field
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Integer field; accepts integral floats and numeric strings
    pub fn i64_field(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Kismet `last_time`, the sync cursor position of this record
    pub fn last_time(&self) -> Option<i64> {
        self.i64_field(keys::LAST_TIME).filter(|t| *t > 0)
    }

    /// Something to identify the record in logs
    pub fn hint(&self) -> String {
        self.0
            .get(keys::MAC)
            .map(|v| v.to_string())
            .or_else(|| self.last_time().map(|t| format!("last_time={}", t)))
            .unwrap_or_else(|| "<no identifier>".to_string())
    }
}

impl From<Value> for RawDeviceRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Body of the Kismet `json` form parameter selecting and renaming fields
pub fn field_selection() -> Value {
    let fields: Vec<Value> = KISMET_FIELDS
        .iter()
        .map(|(path, name)| Value::Array(vec![Value::from(*path), Value::from(*name)]))
        .collect();
    serde_json::json!({ "fields": fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_integers() {
        let rec = RawDeviceRecord::from(json!({
            "last_time": 1700000000,
            "signal_last": "-42",
            "signal_min": -71.0,
            "client_count": "many"
        }));
        assert_eq!(rec.last_time(), Some(1_700_000_000));
        assert_eq!(rec.i64_field(keys::SIGNAL_LAST), Some(-42));
        assert_eq!(rec.i64_field(keys::SIGNAL_MIN), Some(-71));
        assert_eq!(rec.i64_field(keys::CLIENT_COUNT), None);
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let rec = RawDeviceRecord::from(json!({ "ssid": "   " }));
        assert_eq!(rec.str_field(keys::SSID), None);
    }

    #[test]
    fn test_field_selection_renames() {
        let sel = field_selection();
        let fields = sel["fields"].as_array().unwrap();
        assert_eq!(fields.len(), KISMET_FIELDS.len());
        assert_eq!(fields[0], json!(["kismet.device.base.macaddr", "macaddr"]));
    }
}
