// crates/layerconf-db/tests/database.rs
// ============================================================================
// Module: Database Integration Tests
// Description: End-to-end tests for sessions, transactions and encryption.
// Purpose: Validate versioning, rollback, schema checks and decryption policy.
// ============================================================================

//! ## Overview
//! Each test opens a fresh store in a temp directory and drives it through
//! the public builders.

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

use std::sync::Arc;

use common::CapturingSink;
use common::NOTE_STORE;
use common::Note;
use common::open;
use common::open_with;
use layerconf_db::Database;
use layerconf_db::DatabaseConfig;
use layerconf_db::DbError;
use layerconf_db::Delete;
use layerconf_db::Encryptor;
use layerconf_db::ErrorKind;
use layerconf_db::Insert;
use layerconf_db::NoopEventSink;
use layerconf_db::Order;
use layerconf_db::Select;
use layerconf_db::StoreSchema;
use layerconf_db::SubQuery;
use layerconf_db::Update;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn insert(db: &Database, note: &Note) -> Note {
    db.transaction_result("insert_note", |session| Insert::new(note).execute(session)).unwrap()
}

fn history(db: &Database, topic: &str) -> Vec<Note> {
    db.read(|session| {
        Select::<Note>::new().where_eq("Topic", topic).order_by("Version", Order::Asc).get_many(session)
    })
    .unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn versions_are_assigned_per_partition() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir.path().join("store.db"));
    let first = insert(&db, &Note::new("deploy", "one"));
    let second = insert(&db, &Note::new("deploy", "two"));
    let other = insert(&db, &Note::new("rollout", "one"));
    assert_eq!((first.version, second.version, other.version), (1, 2, 1));
    assert!(first.created.is_some());
    assert_eq!(second.body, "two");
}

#[test]
fn latest_rows_via_grouped_sub_query() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir.path().join("store.db"));
    for (topic, body) in [("b", "1"), ("a", "1"), ("a", "2"), ("b", "2"), ("b", "3")] {
        insert(&db, &Note::new(topic, body));
    }
    let latest: Vec<Note> = db
        .read(|session| {
            Select::<Note>::new()
                .where_in(&["Topic", "Version"], SubQuery::latest::<Note>("Version", &["Topic"]))
                .order_by("Topic", Order::Asc)
                .get_many(session)
        })
        .unwrap();
    let summary: Vec<(String, i64, String)> =
        latest.into_iter().map(|note| (note.topic, note.version, note.body)).collect();
    assert_eq!(
        summary,
        vec![("a".to_string(), 2, "2".to_string()), ("b".to_string(), 3, "3".to_string())]
    );
}

#[test]
fn get_one_reports_not_found_with_selector() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir.path().join("store.db"));
    let error = db
        .read(|session| Select::<Note>::new().where_eq("Topic", "missing").get_one(session))
        .unwrap_err();
    assert!(error.is_not_found());
    assert!(error.to_string().contains("Topic='missing'"));
}

#[test]
fn update_and_delete_return_affected_counts() {
    let dir = TempDir::new().unwrap();
    let db = open(&dir.path().join("store.db"));
    insert(&db, &Note::new("deploy", "one"));
    insert(&db, &Note::new("deploy", "two"));
    let mut pinned = Note::new("deploy", "pinned");
    pinned.pinned = true;
    let updated = db
        .transaction_result("pin", |session| {
            Update::new(&pinned).where_eq("Topic", "deploy").where_eq("Version", 1_i64).execute(session)
        })
        .unwrap();
    assert_eq!(updated, 1);
    let notes = history(&db, "deploy");
    assert!(notes[0].pinned && notes[0].body == "pinned");
    assert!(!notes[1].pinned);
    let deleted = db
        .transaction_result("drop", |session| {
            Delete::<Note>::new().where_eq("Topic", "deploy").execute(session)
        })
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(history(&db, "deploy").is_empty());
}

#[test]
fn failed_work_rolls_back_every_statement() {
    let sink = Arc::new(CapturingSink::default());
    let dir = TempDir::new().unwrap();
    let db = open_with(&dir.path().join("store.db"), &Encryptor::generate_key(), sink.clone());
    let result: Result<(), DbError> = db.transaction("two_inserts", |session| {
        Insert::new(&Note::new("deploy", "one")).execute(session)?;
        Insert::new(&Note::new("deploy", "")).execute(session)?;
        Ok(())
    });
    assert_eq!(result.unwrap_err().kind(), ErrorKind::IncompleteEntity);
    assert!(history(&db, "deploy").is_empty());
    let names = sink.names();
    assert!(names.contains(&"transaction_begin"));
    assert!(names.contains(&"transaction_rollback"));
    assert!(!names.contains(&"transaction_commit"));
}

#[test]
fn payloads_are_encrypted_at_rest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    let db = open(&path);
    let mut note = Note::new("deploy", "secret body");
    note.memo = Some("secret memo".to_string());
    let stored = insert(&db, &note);
    assert_eq!(stored.memo.as_deref(), Some("secret memo"));
    drop(db);
    let raw = Connection::open(&path).unwrap();
    let (body, memo): (String, String) = raw
        .query_row("SELECT body, memo FROM notes WHERE topic = ?1", params!["deploy"], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert!(!body.contains("secret"));
    assert!(!memo.contains("secret"));
}

#[test]
fn rotated_key_fails_required_but_tolerates_optional_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    let mut note = Note::new("deploy", "body");
    note.memo = Some("memo".to_string());
    insert(&open(&path), &note);

    let sink = Arc::new(CapturingSink::default());
    let rotated = open_with(&path, &Encryptor::generate_key(), sink.clone());
    let error = rotated
        .read(|session| Select::<Note>::new().where_eq("Topic", "deploy").get_one(session))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Decryption);

    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE notes SET body = 'legacy plain body'", params![]).unwrap();
    drop(raw);
    let read = rotated
        .read(|session| Select::<Note>::new().where_eq("Topic", "deploy").get_one(session))
        .unwrap_err();
    assert_eq!(read.kind(), ErrorKind::Decryption);

    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE notes SET body = ?1", params![rotated.encryptor().encrypt("new").unwrap()])
        .unwrap();
    drop(raw);
    let recovered = rotated
        .read(|session| Select::<Note>::new().where_eq("Topic", "deploy").get_one(session))
        .unwrap();
    assert_eq!(recovered.body, "new");
    assert!(recovered.memo.is_some_and(|memo| memo != "memo"));
    assert!(sink.names().contains(&"decryption_fallback"));
}

#[test]
fn reopen_rejects_other_schema_versions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    drop(open(&path));
    let newer = StoreSchema {
        version: NOTE_STORE.version + 1,
        ddl: NOTE_STORE.ddl,
    };
    let error = Database::open(
        &DatabaseConfig::new(&path),
        Encryptor::new(&Encryptor::generate_key()).unwrap(),
        Arc::new(NoopEventSink),
        &newer,
    )
    .unwrap_err();
    assert!(matches!(error, DbError::VersionMismatch(_)));
    assert_eq!(error.kind(), ErrorKind::Storage);
    drop(open(&path));
}

#[test]
fn store_paths_are_validated() {
    let dir = TempDir::new().unwrap();
    let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
    let as_dir = Database::open(
        &DatabaseConfig::new(dir.path()),
        encryptor.clone(),
        Arc::new(NoopEventSink),
        &NOTE_STORE,
    )
    .unwrap_err();
    assert_eq!(as_dir.kind(), ErrorKind::Invalid);
    let long = dir.path().join("a".repeat(300));
    assert!(DatabaseConfig::new(long).validate().is_err());
    assert!(DatabaseConfig::new("").validate().is_err());
    let nested = dir.path().join("nested").join("deeper").join("store.db");
    Database::open(&DatabaseConfig::new(&nested), encryptor, Arc::new(NoopEventSink), &NOTE_STORE)
        .unwrap();
    assert!(nested.exists());
}
