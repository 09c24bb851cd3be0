// crates/layerconf-db/tests/query_builder.rs
// ============================================================================
// Module: Query Builder Tests
// Description: Rendering tests for the statement builders.
// Purpose: Pin placeholder numbering, quoting and clause ordering.
// ============================================================================

//! ## Overview
//! Rendering is pure, so these tests inspect SQL text and arguments without
//! opening a database.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::Note;
use layerconf_db::Delete;
use layerconf_db::Encryptor;
use layerconf_db::ErrorKind;
use layerconf_db::Insert;
use layerconf_db::Order;
use layerconf_db::Select;
use layerconf_db::SubQuery;
use layerconf_db::Update;
use rusqlite::types::Value as SqlValue;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn equality_filters_render_sorted_by_field() {
    let statement = Select::<Note>::new()
        .where_eq("Topic", "deploy")
        .where_eq("Pinned", true)
        .render()
        .unwrap();
    assert_eq!(
        statement.sql,
        "SELECT \"topic\", \"version\", \"body\", \"memo\", \"pinned\", \"created\" FROM \
         \"notes\" WHERE \"pinned\" = ?1 AND \"topic\" = ?2"
    );
    assert_eq!(statement.args, vec![SqlValue::Integer(1), SqlValue::Text("deploy".to_string())]);
}

#[test]
fn rendering_does_not_consume_the_builder() {
    let select = Select::<Note>::new().where_eq("Topic", "a");
    let first = select.render().unwrap();
    let second = select.clone().order_by("Version", Order::Desc).limit(1).render().unwrap();
    assert_eq!(first, select.render().unwrap());
    assert!(second.sql.ends_with("ORDER BY \"version\" DESC LIMIT 1"));
}

#[test]
fn row_value_sub_query_shares_placeholder_numbering() {
    let latest = SubQuery::latest::<Note>("Version", &["Topic"]).where_eq("Pinned", false);
    let statement = Select::<Note>::new()
        .where_eq("Topic", "deploy")
        .where_in(&["Topic", "Version"], latest)
        .render()
        .unwrap();
    assert!(statement.sql.contains(
        "WHERE \"topic\" = ?1 AND (\"topic\", \"version\") IN (SELECT \"topic\", \
         MAX(\"version\") FROM \"notes\" WHERE \"pinned\" = ?2 GROUP BY \"topic\")"
    ));
    assert_eq!(statement.args.len(), 2);
}

#[test]
fn row_value_width_must_match_sub_query() {
    let latest = SubQuery::latest::<Note>("Version", &["Topic"]);
    let error = Select::<Note>::new().where_in(&["Topic"], latest).render().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Invalid);
}

#[test]
fn empty_value_list_matches_nothing() {
    let statement =
        Select::<Note>::new().where_in_values("Topic", Vec::<String>::new()).render().unwrap();
    assert!(statement.sql.ends_with("WHERE 1 = 0"));
    let statement = Delete::<Note>::new().where_in_values("Topic", ["a", "b"]).render().unwrap();
    assert_eq!(statement.sql, "DELETE FROM \"notes\" WHERE \"topic\" IN (?1, ?2)");
}

#[test]
fn unknown_and_encrypted_filters_are_rejected() {
    let unknown = Select::<Note>::new().where_eq("Nope", "x").render().unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::Invalid);
    assert!(unknown.to_string().contains("Nope"));
    let encrypted = Select::<Note>::new().where_eq("Body", "x").render().unwrap_err();
    assert_eq!(encrypted.kind(), ErrorKind::Invalid);
}

#[test]
fn insert_computes_version_inside_the_statement() {
    let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
    let note = Note::new("deploy", "body");
    let statement = Insert::new(&note).render(&encryptor).unwrap();
    assert_eq!(
        statement.sql,
        "INSERT INTO \"notes\" (\"topic\", \"body\", \"memo\", \"pinned\", \"version\") SELECT \
         ?1, ?2, ?3, ?4, COALESCE(MAX(\"version\"), 0) + 1 FROM \"notes\" WHERE \"topic\" = ?1 \
         RETURNING \"topic\", \"version\", \"body\", \"memo\", \"pinned\", \"created\""
    );
    let SqlValue::Text(sealed) = &statement.args[1] else {
        panic!("body should bind as text");
    };
    assert!(sealed.starts_with(encryptor.key_id()));
    assert_eq!(statement.args[2], SqlValue::Null);
}

#[test]
fn insert_rejects_incomplete_records() {
    let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
    let error = Insert::new(&Note::default()).render(&encryptor).unwrap_err();
    assert!(error.is_incomplete_entity());
    let message = error.to_string();
    assert!(message.contains("Topic") && message.contains("Body"));
}

#[test]
fn update_sets_only_writable_columns() {
    let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
    let mut note = Note::new("deploy", "body");
    note.pinned = true;
    let statement = Update::new(&note)
        .where_eq("Topic", "deploy")
        .where_eq("Version", 2_i64)
        .render(&encryptor)
        .unwrap();
    assert!(statement.sql.starts_with(
        "UPDATE \"notes\" SET \"topic\" = ?1, \"body\" = ?2, \"memo\" = ?3, \"pinned\" = ?4 WHERE"
    ));
    assert!(statement.sql.ends_with("WHERE \"topic\" = ?5 AND \"version\" = ?6"));
}

#[test]
fn distinct_sub_query_projects_plain_columns() {
    let statement = SubQuery::columns::<Note>(&["Topic"]).where_eq("Pinned", true).render().unwrap();
    assert_eq!(statement.sql, "SELECT DISTINCT \"topic\" FROM \"notes\" WHERE \"pinned\" = ?1");
}
