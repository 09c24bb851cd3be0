// crates/layerconf-db/src/lib.rs
// ============================================================================
// Module: Layerconf DB Library
// Description: Generic relational entity layer on top of SQLite.
// Purpose: Persist typed records with validation, encryption and versioning.
// Dependencies: rusqlite, aes-gcm, sha2, time, serde, thiserror
// ============================================================================

//! ## Overview
//! `layerconf-db` maps typed records onto `SQLite` tables without per-entity
//! SQL. Each record type declares a static [`EntitySchema`] once; from it the
//! [`EntityMarshaller`] converts records to field maps, the [`ColumnHandler`]
//! validates required fields and encrypts sensitive columns, and the
//! statement builders in [`query`] render parameterized SQL. All statements
//! run on a [`Session`] handed out by [`Database`], either inside an
//! immediate transaction or as a plain read.
//!
//! Security posture: database contents are untrusted. Encrypted columns are
//! authenticated on read, and decoded rows are converted through the declared
//! field kinds before reaching callers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod column;
pub mod database;
pub mod encryption;
pub mod error;
pub mod events;
pub mod field;
pub mod marshaller;
pub mod query;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use column::ColumnHandler;
pub use database::Database;
pub use database::DatabaseConfig;
pub use database::JournalMode;
pub use database::Session;
pub use database::StoreSchema;
pub use database::SyncMode;
pub use database::TransactionError;
pub use encryption::Encryptor;
pub use error::DbError;
pub use error::ErrorKind;
pub use events::EventLevel;
pub use events::FileEventSink;
pub use events::NoopEventSink;
pub use events::StderrEventSink;
pub use events::StoreEvent;
pub use events::StoreEventSink;
pub use field::FieldMap;
pub use field::FieldValue;
pub use marshaller::Entity;
pub use marshaller::EntityMarshaller;
pub use query::Delete;
pub use query::Insert;
pub use query::Order;
pub use query::Select;
pub use query::Statement;
pub use query::SubQuery;
pub use query::Update;
pub use schema::ColumnDef;
pub use schema::EntitySchema;
pub use schema::FieldConverter;
pub use schema::FieldKind;
pub use schema::to_snake_case;
