//! Analyst prompt construction

use serde_json::{json, Value};

use crate::logic::features::FeatureDocument;

pub const SYSTEM_PROMPT: &str = "You are a wireless intrusion detection analyst. \
Given a structured WIDS feature document about a Wi-Fi access point or wireless device, \
produce concise, actionable security context for an analyst dashboard.";

const INSTRUCTIONS: &str = "Analyze this wireless feature document and write an analyst-facing \
security explanation in plain text (no JSON, no markdown headings):\n\
- 2-4 sentences of context\n\
- a line `Threat type: <rogue_ap|deauth_attack|scanner|benign|unknown> (confidence: 0-100)`\n\
- up to 5 short indicator bullets\n\
- up to 5 short mitigation bullets";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPrompt {
    pub system: String,
    pub user: String,
}

/// The fields an analyst cares about, flattened with their index names
pub fn important_fields(doc: &FeatureDocument) -> Value {
    json!({
        "@timestamp": doc.timestamp,
        "sensor.id": doc.sensor.id,
        "sensor.site": doc.sensor.site,
        "bssid": doc.bssid,
        "ssid": doc.ssid,
        "manuf": doc.manuf,
        "channel": doc.channel,
        "phyname": doc.phyname,
        "device_type": doc.device_type,
        "first_seen": doc.first_seen,
        "last_seen": doc.last_seen,
        "client_count": doc.client_count,
        "packets_total": doc.packets_total,
        "ssid_entropy": doc.ssid_entropy,
        "rssi_last": doc.rssi_last,
        "rssi_min": doc.rssi_min,
        "rssi_max": doc.rssi_max,
        "rssi_mean": doc.rssi_mean,
        "anomaly_score": doc.anomaly_score,
        "anomaly_label": doc.anomaly_label,
    })
}

pub fn build_prompt(doc: &FeatureDocument) -> ContextPrompt {
    let fields = serde_json::to_string_pretty(&important_fields(doc)).unwrap_or_default();
    ContextPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!("{}\n\nDocument:\n{}", INSTRUCTIONS, fields),
    }
}
