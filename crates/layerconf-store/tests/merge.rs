// crates/layerconf-store/tests/merge.rs
// ============================================================================
// Module: Bucket Merge Tests
// Description: Layered resolution of default and override buckets.
// Purpose: Ensure later layers win and stored payloads decode to typed values.
// ============================================================================

//! ## Overview
//! Merges against a real store: override order, missing layers, latest
//! versions and inconsistent rows written behind the store's back.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeMap;

use common::fixture;
use layerconf_db::ErrorKind;
use layerconf_expr::Value;
use layerconf_store::DataType;
use layerconf_store::KeyEntity;
use layerconf_store::StoreError;
use rusqlite::Connection;

fn layers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(layer, sub)| ((*layer).to_string(), (*sub).to_string())).collect()
}

#[test]
fn later_layers_override_earlier_ones() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    let replicas = fx.key(KeyEntity::new("replicas", DataType::Integer, "alice"));
    let debug = fx.key(KeyEntity::new("debug", DataType::Boolean, "alice"));
    fx.put("default", &color, "grey");
    fx.put("default", &replicas, "1");
    fx.put("default", &debug, "false");
    fx.put("landscape-dev", &replicas, "2");
    fx.put("landscape-dev", &debug, "T");
    fx.put("customer-acme", &color, "red");

    let merged = fx
        .service
        .merger()
        .merge(&layers(&[("customer", "acme"), ("landscape", "dev")]))
        .unwrap();
    assert_eq!(merged.buckets(), ["default", "landscape-dev", "customer-acme"]);
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.get("color"), Some(&Value::Str("red".to_string())));
    assert_eq!(merged.get("replicas"), Some(&Value::Int(2)));
    assert_eq!(merged.get("debug"), Some(&Value::Bool(true)));
    assert_eq!(merged.value("color").unwrap().bucket, "customer-acme");
    assert_eq!(merged.value("debug").unwrap().value, "T");

    let keys: Vec<&str> = merged.get_all().into_keys().collect();
    assert_eq!(keys, ["color", "debug", "replicas"]);
}

#[test]
fn missing_layer_buckets_contribute_nothing() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    fx.put("default", &color, "grey");

    let merged = fx.service.merger().merge(&layers(&[("cluster", "c9")])).unwrap();
    assert_eq!(merged.buckets(), ["default", "cluster-c9"]);
    assert_eq!(merged.get("color"), Some(&Value::Str("grey".to_string())));
}

#[test]
fn empty_store_merges_to_nothing() {
    let fx = fixture();
    let merged = fx.service.merger().merge(&BTreeMap::new()).unwrap();
    assert!(merged.is_empty());
    assert!(merged.values().is_empty());
}

#[test]
fn latest_version_within_a_bucket_wins() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    fx.put("default", &color, "grey");
    fx.put("default", &color, "black");

    let merged = fx.service.merger().merge(&BTreeMap::new()).unwrap();
    let value = merged.value("color").unwrap();
    assert_eq!((value.value.as_str(), value.version), ("black", 2));
}

#[test]
fn undecodable_rows_are_data_inconsistencies() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    fx.put("default", &color, "grey");
    let raw = Connection::open(fx.db_path()).unwrap();
    raw.execute("UPDATE config_values SET data_type = 'integer' WHERE key = 'color'", []).unwrap();
    drop(raw);

    let error = fx.service.merger().merge(&BTreeMap::new()).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DataInconsistency);
    match error {
        StoreError::DataInconsistency {
            bucket,
            key,
            ..
        } => assert_eq!((bucket.as_str(), key.as_str()), ("default", "color")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_layers_fail_before_reading() {
    let fx = fixture();
    let error = fx.service.merger().merge(&layers(&[("region", "eu")])).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Invalid);
    assert!(matches!(error, StoreError::InvalidMergeLayer { ref layer } if layer == "region"));
}
