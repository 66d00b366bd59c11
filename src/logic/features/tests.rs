//! Normalize → vector integration tests

use serde_json::json;

use super::*;
use crate::logic::kismet::record::RawDeviceRecord;

fn ctx() -> NormalizeContext {
    NormalizeContext {
        sensor: SensorInfo { id: "s1".into(), site: None },
        identity: IdentityMode::Latest,
    }
}

#[test]
fn test_vector_follows_layout_order() {
    let rec = RawDeviceRecord::from(json!({
        "macaddr": "aa:bb:cc:dd:ee:ff",
        "last_time": 1_700_000_000,
        "ssid": "ab",
        "signal_min": -80,
        "signal_max": -40,
        "client_count": 7
    }));
    let doc = normalize(&rec, &ctx()).unwrap();
    let v = FeatureVector::from_document(&doc);

    assert_eq!(v.values.len(), FEATURE_COUNT);
    assert_eq!(v.values[0], 1.0); // "ab" = 1 bit
    assert_eq!(v.values[1], -60.0);
    assert_eq!(v.values[2], -80.0);
    assert_eq!(v.values[3], -40.0);
    assert_eq!(v.values[4], 7.0);
    assert_eq!(FeatureVector::present_count(&doc), FEATURE_COUNT);
}

#[test]
fn test_missing_features_fill_zero() {
    let rec = RawDeviceRecord::from(json!({ "macaddr": "aa:bb:cc:dd:ee:ff", "last_time": 1_700_000_000 }));
    let doc = normalize(&rec, &ctx()).unwrap();
    let v = FeatureVector::from_document(&doc);

    assert!(v.as_slice().iter().all(|x| *x == 0.0));
    assert_eq!(FeatureVector::present_count(&doc), 0);
}

#[test]
fn test_newer_record_same_identity() {
    let older = RawDeviceRecord::from(json!({ "macaddr": "AA:BB:CC:DD:EE:FF", "last_time": 100, "signal_last": -70 }));
    let newer = RawDeviceRecord::from(json!({ "macaddr": "aa:bb:cc:dd:ee:ff", "last_time": 200, "signal_last": -50 }));

    let a = normalize(&older, &ctx()).unwrap();
    let b = normalize(&newer, &ctx()).unwrap();
    assert_eq!(a.doc_id(), b.doc_id());
    assert_eq!(b.rssi_last, Some(-50));
}
