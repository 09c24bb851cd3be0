// crates/layerconf-store/tests/key_values.rs
// ============================================================================
// Module: Key/Value Repository Tests
// Description: Versioning, typing, validation and delete behavior.
// Purpose: Ensure keys and values stay append-only and key-consistent.
// ============================================================================

//! ## Overview
//! Drives the key/value repository against a fresh store per test and checks
//! stored rows, error kinds and recorded events.

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

use std::thread;
use std::time::Duration;

use common::fixture;
use layerconf_db::ErrorKind;
use layerconf_store::DataType;
use layerconf_store::KeyEntity;
use layerconf_store::ValueEntity;
use rusqlite::Connection;

// ============================================================================
// SECTION: Keys
// ============================================================================

#[test]
fn identical_keys_do_not_add_versions() {
    let fx = fixture();
    let kv = fx.service.kv();
    let first = fx.string_key("color", Some("len(it) > 2"));
    let again = fx.string_key("color", Some("len(it) > 2"));
    assert_eq!((first.version, again.version), (1, 1));
    assert_eq!(fx.events.count("dedup_noop"), 1);

    let changed = fx.string_key("color", Some("len(it) > 3"));
    assert_eq!(changed.version, 2);
    assert_eq!(kv.key_history("color").unwrap().len(), 2);
    assert_eq!(kv.latest_key("color").unwrap().validator.as_deref(), Some("len(it) > 3"));
    assert_eq!(kv.key_at("color", 1).unwrap().validator.as_deref(), Some("len(it) > 2"));
    assert!(first.created.is_some());
}

#[test]
fn keys_lists_latest_version_ordered_by_name() {
    let fx = fixture();
    fx.string_key("zeta", None);
    fx.string_key("alpha", None);
    fx.key(KeyEntity::new("alpha", DataType::String, "bob").with_trigger("reload"));

    let keys = fx.service.kv().keys().unwrap();
    let names: Vec<&str> = keys.iter().map(|key| key.key.as_str()).collect();
    assert_eq!(names, ["alpha", "zeta"]);
    assert_eq!(keys[0].version, 2);
    assert_eq!(keys[0].trigger.as_deref(), Some("reload"));
    assert_eq!(keys[0].username, "bob");
}

#[test]
fn missing_keys_are_not_found() {
    let fx = fixture();
    let error = fx.service.kv().latest_key("nope").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(error.is_not_found());
    assert!(fx.service.kv().key_history("nope").unwrap().is_empty());
}

#[test]
fn keys_without_name_are_incomplete() {
    let fx = fixture();
    let error =
        fx.service.kv().create_key(&KeyEntity::new("", DataType::String, "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IncompleteEntity);
    assert!(fx.service.kv().keys().unwrap().is_empty());
}

// ============================================================================
// SECTION: Values
// ============================================================================

#[test]
fn value_versions_are_counted_per_bucket_and_key() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    let red = fx.put("team-a", &color, "red");
    let blue = fx.put("team-a", &color, "blue");
    let other = fx.put("team-b", &color, "red");
    assert_eq!((red.version, blue.version, other.version), (1, 2, 1));
    assert_eq!(red.data_type, Some(DataType::String));
    assert_eq!(red.key_version, 1);

    let history = kv.value_history("team-a", "color").unwrap();
    let payloads: Vec<&str> = history.iter().map(|value| value.value.as_str()).collect();
    assert_eq!(payloads, ["red", "blue"]);
    assert_eq!(kv.value_at("team-a", "color", 1).unwrap().value, "red");
    assert_eq!(kv.latest_value("team-a", "color").unwrap().value, "blue");
}

#[test]
fn identical_values_are_a_noop() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    let first = fx.put("team-a", &color, "red");
    let again = fx.put("team-a", &color, "red");
    assert_eq!(first, again);
    assert_eq!(fx.service.kv().value_history("team-a", "color").unwrap().len(), 1);
    assert_eq!(fx.events.count("dedup_noop"), 1);
}

#[test]
fn explicit_data_type_must_match_the_key() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);

    let conflicting =
        ValueEntity::new("team-a", &color, "red", "alice").with_data_type(DataType::Integer);
    let error = kv.create_value(&conflicting).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidDataType);
    assert!(error.to_string().contains("integer"));

    let matching =
        ValueEntity::new("team-a", &color, "red", "alice").with_data_type(DataType::String);
    assert_eq!(kv.create_value(&matching).unwrap().version, 1);
}

#[test]
fn payloads_must_decode_per_data_type() {
    let fx = fixture();
    let kv = fx.service.kv();
    let replicas = fx.key(KeyEntity::new("replicas", DataType::Integer, "alice"));
    let debug = fx.key(KeyEntity::new("debug", DataType::Boolean, "alice"));

    let error =
        kv.create_value(&ValueEntity::new("team-a", &replicas, "three", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
    assert_eq!(
        error.to_string(),
        "key 'replicas' expects a value of type integer: provided value was 'three'"
    );
    let error = kv.create_value(&ValueEntity::new("team-a", &debug, "yes", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);

    assert_eq!(fx.put("team-a", &replicas, "-3").value, "-3");
    assert_eq!(fx.put("team-a", &debug, "TRUE").value, "TRUE");
}

#[test]
fn rejected_payloads_never_persist() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", Some("len(it) > 2"));
    let error = kv.create_value(&ValueEntity::new("team-a", &color, "x", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(error.to_string(), "validation defined in key 'color' failed for value 'x'");
    assert!(kv.latest_value("team-a", "color").unwrap_err().is_not_found());
    assert!(kv.values_by_bucket("team-a").unwrap().is_empty());
}

#[test]
fn validators_see_typed_payload_under_both_names() {
    let fx = fixture();
    let kv = fx.service.kv();
    let replicas = fx.key(
        KeyEntity::new("replicas", DataType::Integer, "alice")
            .with_validator("it >= 1 && value <= 10"),
    );
    assert_eq!(fx.put("default", &replicas, "10").version, 1);
    let error =
        kv.create_value(&ValueEntity::new("default", &replicas, "11", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[test]
fn broken_validators_are_parse_errors_not_validation_failures() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", Some("len(it) >"));
    let error = kv.create_value(&ValueEntity::new("team-a", &color, "red", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);

    let typo = fx.string_key("size", Some("lenght(it) > 0"));
    let error = kv.create_value(&ValueEntity::new("team-a", &typo, "xl", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Parse);
}

#[test]
fn values_require_an_existing_key_version() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    let mut value = ValueEntity::new("team-a", &color, "red", "alice");
    value.key_version = 9;
    let error = fx.service.kv().create_value(&value).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn malformed_bucket_names_are_rejected() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    for bucket in ["Team-A", "team", "team_a"] {
        let error =
            kv.create_value(&ValueEntity::new(bucket, &color, "red", "alice")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Invalid, "{bucket}");
    }
    assert!(kv.buckets().unwrap().is_empty());
}

// ============================================================================
// SECTION: Latest-Wins Reads
// ============================================================================

#[test]
fn values_by_bucket_returns_latest_per_key() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    let size = fx.string_key("size", None);
    fx.put("team-a", &color, "red");
    fx.put("team-a", &size, "l");
    fx.put("team-a", &color, "blue");
    fx.put("team-b", &color, "green");

    let values = fx.service.kv().values_by_bucket("team-a").unwrap();
    let pairs: Vec<(&str, &str, i64)> = values
        .iter()
        .map(|value| (value.key.as_str(), value.value.as_str(), value.version))
        .collect();
    assert_eq!(pairs, [("color", "blue", 2), ("size", "l", 1)]);
}

#[test]
fn values_by_key_returns_latest_per_bucket_for_the_key_version() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    fx.put("team-b", &color, "red");
    fx.put("team-a", &color, "red");
    fx.put("team-a", &color, "blue");

    let values = fx.service.kv().values_by_key(&color).unwrap();
    let pairs: Vec<(&str, &str)> =
        values.iter().map(|value| (value.bucket.as_str(), value.value.as_str())).collect();
    assert_eq!(pairs, [("team-a", "blue"), ("team-b", "red")]);

    let stricter = fx.string_key("color", Some("len(it) > 3"));
    assert!(fx.service.kv().values_by_key(&stricter).unwrap().is_empty());
}

#[test]
fn buckets_report_their_earliest_row() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    fx.put("team-b", &color, "red");
    thread::sleep(Duration::from_millis(5));
    kv.create_value(&ValueEntity::new("team-b", &color, "blue", "bob")).unwrap();
    kv.create_value(&ValueEntity::new("team-a", &color, "red", "bob")).unwrap();

    let buckets = kv.buckets().unwrap();
    let names: Vec<(&str, &str)> =
        buckets.iter().map(|bucket| (bucket.bucket.as_str(), bucket.username.as_str())).collect();
    assert_eq!(names, [("team-a", "bob"), ("team-b", "alice")]);
    assert!(buckets.iter().all(|bucket| bucket.created.is_some()));
    assert_eq!((buckets[1].key.as_str(), buckets[1].version), ("color", 1));
}

#[test]
fn bucket_creation_ties_resolve_by_version_then_key() {
    let fx = fixture();
    let kv = fx.service.kv();
    let size = fx.string_key("size", None);
    let color = fx.string_key("color", None);
    kv.create_value(&ValueEntity::new("team-a", &size, "l", "bob")).unwrap();
    kv.create_value(&ValueEntity::new("team-a", &size, "xl", "carol")).unwrap();
    fx.put("team-a", &color, "red");
    let raw = Connection::open(fx.db_path()).unwrap();
    raw.execute_batch("UPDATE config_values SET created = '2026-01-01T00:00:00.000Z';").unwrap();
    drop(raw);

    let buckets = kv.buckets().unwrap();
    assert_eq!(buckets.len(), 1);
    let earliest = &buckets[0];
    assert_eq!(
        (earliest.key.as_str(), earliest.version, earliest.username.as_str()),
        ("color", 1, "alice")
    );
}

// ============================================================================
// SECTION: Deletes
// ============================================================================

#[test]
fn delete_key_removes_every_version_and_value() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    fx.put("team-a", &color, "red");
    fx.put("team-b", &color, "red");
    fx.string_key("color", Some("len(it) > 0"));
    let size = fx.string_key("size", None);
    fx.put("team-a", &size, "l");

    let deletion = kv.delete_key("color").unwrap();
    assert_eq!((deletion.keys, deletion.values), (2, 2));
    assert!(kv.latest_key("color").unwrap_err().is_not_found());
    assert_eq!(kv.values_by_bucket("team-a").unwrap().len(), 1);
    assert_eq!(kv.keys().unwrap().len(), 1);
}

#[test]
fn delete_value_and_bucket_are_scoped() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    let size = fx.string_key("size", None);
    fx.put("team-a", &color, "red");
    fx.put("team-a", &color, "blue");
    fx.put("team-a", &size, "l");
    fx.put("team-b", &size, "s");

    assert_eq!(kv.delete_value("color", "team-a").unwrap().values, 2);
    assert_eq!(kv.values_by_bucket("team-a").unwrap().len(), 1);

    assert_eq!(kv.delete_bucket("team-a").unwrap().values, 1);
    let buckets: Vec<String> =
        kv.buckets().unwrap().into_iter().map(|bucket| bucket.bucket).collect();
    assert_eq!(buckets, ["team-b"]);
    assert_eq!(kv.latest_key("color").unwrap().version, 1);
}

// ============================================================================
// SECTION: Storage
// ============================================================================

#[test]
fn value_payloads_are_encrypted_at_rest() {
    let fx = fixture();
    let color = fx.string_key("color", None);
    fx.put("team-a", &color, "crimson");

    let raw = Connection::open(fx.db_path()).unwrap();
    let (stored, data_type): (String, String) = raw
        .query_row("SELECT value, data_type FROM config_values", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert!(!stored.contains("crimson"));
    assert_eq!(data_type, "string");
}

#[test]
fn failed_invalidation_leaves_no_value_behind() {
    let fx = fixture();
    let kv = fx.service.kv();
    let color = fx.string_key("color", None);
    let raw = Connection::open(fx.db_path()).unwrap();
    raw.execute_batch("DROP TABLE config_cachedeps;").unwrap();
    drop(raw);

    let error = kv.create_value(&ValueEntity::new("team-a", &color, "red", "alice")).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Storage);
    assert!(kv.latest_value("team-a", "color").unwrap_err().is_not_found());
    assert!(fx.events.names().contains(&"transaction_rollback"));
}
