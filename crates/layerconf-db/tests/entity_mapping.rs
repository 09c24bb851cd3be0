// crates/layerconf-db/tests/entity_mapping.rs
// ============================================================================
// Module: Entity Mapping Tests
// Description: Marshaller converters and column handler behavior.
// Purpose: Validate field conversion, required checks and column encryption.
// ============================================================================

//! ## Overview
//! Drives the `Note` fixture through `EntityMarshaller` and `ColumnHandler`
//! without opening a database.

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

use common::Note;
use layerconf_db::ColumnHandler;
use layerconf_db::DbError;
use layerconf_db::Encryptor;
use layerconf_db::Entity;
use layerconf_db::EntityMarshaller;
use layerconf_db::ErrorKind;
use layerconf_db::FieldMap;
use layerconf_db::FieldValue;
use rusqlite::types::Value as SqlValue;

// ============================================================================
// SECTION: Converters
// ============================================================================

fn shout(value: FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Text(text) => Ok(FieldValue::Text(text.to_uppercase())),
        other => Ok(other),
    }
}

fn refuse(_: FieldValue) -> Result<FieldValue, String> {
    Err("topic is frozen".to_string())
}

// ============================================================================
// SECTION: Marshaller
// ============================================================================

#[test]
fn registered_converters_run_on_marshal() {
    let mut marshaller = EntityMarshaller::<Note>::new();
    marshaller.add_marshaller("Body", shout).unwrap();
    let fields = marshaller.marshal(&Note::new("deploy", "hello")).unwrap();
    assert_eq!(fields.get("Body"), Some(&FieldValue::Text("HELLO".to_string())));
    assert_eq!(fields.get("Topic"), Some(&FieldValue::Text("deploy".to_string())));
}

#[test]
fn converters_for_undeclared_fields_are_rejected() {
    let mut marshaller = EntityMarshaller::<Note>::new();
    let error = marshaller.add_unmarshaller("Author", shout).unwrap_err();
    assert!(matches!(error, DbError::UnknownField { ref field, .. } if field == "Author"));
}

#[test]
fn converter_failures_are_conversion_errors() {
    let mut marshaller = EntityMarshaller::<Note>::new();
    marshaller.add_unmarshaller("Topic", refuse).unwrap();
    let fields = marshaller.marshal(&Note::new("deploy", "hello")).unwrap();
    let error = marshaller.unmarshal(fields).unwrap_err();
    match error {
        DbError::Conversion {
            field,
            message,
        } => assert_eq!((field.as_str(), message.as_str()), ("Topic", "topic is frozen")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unmarshal_requires_every_declared_field() {
    let marshaller = EntityMarshaller::<Note>::new();
    let fields = FieldMap::new().with("Topic", "deploy").with("Version", 1_i64);
    let error = marshaller.unmarshal(fields).unwrap_err();
    assert!(matches!(error, DbError::MissingField { ref field, .. } if field == "Body"));
}

#[test]
fn marshal_then_unmarshal_keeps_the_record() {
    let marshaller = EntityMarshaller::<Note>::new();
    let mut note = Note::new("deploy", "hello");
    note.memo = Some("draft".to_string());
    note.pinned = true;
    let back = marshaller.unmarshal(marshaller.marshal(&note).unwrap()).unwrap();
    assert_eq!(back, note);
}

// ============================================================================
// SECTION: Column Handler
// ============================================================================

#[test]
fn validation_lists_every_empty_required_field() {
    let handler = ColumnHandler::new(Note::schema(), Note::default().to_fields());
    let error = handler.validate().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::IncompleteEntity);
    match error {
        DbError::IncompleteEntity {
            table,
            fields,
        } => {
            assert_eq!(table, "notes");
            assert_eq!(fields, ["Topic", "Body"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    let complete = ColumnHandler::new(Note::schema(), Note::new("deploy", "x").to_fields());
    assert!(complete.validate().is_ok());
}

#[test]
fn writable_columns_skip_storage_assigned_fields() {
    let handler = ColumnHandler::new(Note::schema(), Note::new("deploy", "x").to_fields());
    assert_eq!(handler.column_names(true), ["topic", "body", "memo", "pinned"]);
    assert_eq!(
        handler.column_names(false),
        ["topic", "version", "body", "memo", "pinned", "created"]
    );
}

#[test]
fn column_values_encrypt_marked_fields_only() {
    let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
    let handler = ColumnHandler::new(Note::schema(), Note::new("deploy", "secret").to_fields());
    let values = handler.column_values(true, &encryptor).unwrap();
    assert_eq!(values.len(), 4);
    assert_eq!(values[0], SqlValue::Text("deploy".to_string()));
    let SqlValue::Text(sealed) = &values[1] else {
        panic!("encrypted body must be text");
    };
    assert_ne!(sealed, "secret");
    assert!(encryptor.decryptable(sealed));
    assert_eq!(encryptor.decrypt(sealed).unwrap(), "secret");
    assert_eq!(values[2], SqlValue::Null);
    assert_eq!(values[3], SqlValue::Integer(0));
}

#[test]
fn resolve_maps_logical_to_physical_names() {
    let handler = ColumnHandler::new(Note::schema(), FieldMap::new());
    assert_eq!(handler.resolve("Pinned").unwrap(), "pinned");
    let error = handler.resolve("Author").unwrap_err();
    assert!(matches!(error, DbError::UnknownField { .. }));
}
