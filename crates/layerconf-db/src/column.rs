// crates/layerconf-db/src/column.rs
// ============================================================================
// Module: Column Handler
// Description: Schema-aware access to a marshalled record's columns.
// Purpose: Validate required fields and encrypt or decrypt column values.
// Dependencies: rusqlite, crate::schema, crate::field, crate::encryption
// ============================================================================

//! ## Overview
//! A [`ColumnHandler`] wraps one marshalled record together with its schema.
//! It produces the physical column list and the SQL parameter list for
//! writes, sealing encrypted fields on the way out. [`read_row`] performs
//! the reverse for result rows: it opens encrypted columns and decodes every
//! value through its declared kind.
//!
//! Decryption failures on required fields are fatal. Optional encrypted
//! fields fall back to the raw stored value and record a warning event, so
//! rows written before a field became encrypted remain readable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Row;
use rusqlite::types::Value as SqlValue;

use crate::encryption::Encryptor;
use crate::error::DbError;
use crate::events::EventLevel;
use crate::events::StoreEvent;
use crate::events::StoreEventSink;
use crate::field::FieldMap;
use crate::field::FieldValue;
use crate::schema::ColumnDef;
use crate::schema::EntitySchema;
use crate::schema::FieldKind;

// ============================================================================
// SECTION: Column Handler
// ============================================================================

/// Marshalled record bound to its schema.
#[derive(Debug, Clone)]
pub struct ColumnHandler {
    /// Entity schema.
    schema: &'static EntitySchema,
    /// Marshalled field values.
    fields: FieldMap,
}

impl ColumnHandler {
    /// Wraps marshalled fields with their schema.
    #[must_use]
    pub const fn new(schema: &'static EntitySchema, fields: FieldMap) -> Self {
        Self {
            schema,
            fields,
        }
    }

    /// Returns the wrapped field map.
    #[must_use]
    pub const fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Rejects the record when any required field is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::IncompleteEntity`] listing every empty required
    /// field.
    pub fn validate(&self) -> Result<(), DbError> {
        let empty: Vec<String> = self
            .schema
            .columns()
            .iter()
            .filter(|column| column.is_required())
            .filter(|column| self.fields.get(column.field()).is_none_or(FieldValue::is_empty))
            .map(|column| column.field().to_string())
            .collect();
        if empty.is_empty() {
            Ok(())
        } else {
            Err(DbError::IncompleteEntity {
                table: self.schema.table(),
                fields: empty,
            })
        }
    }

    /// Returns physical column names, optionally skipping read-only fields.
    #[must_use]
    pub fn column_names(&self, writable_only: bool) -> Vec<&str> {
        self.selected(writable_only).map(ColumnDef::column).collect()
    }

    /// Returns SQL parameters in column order, encrypting marked fields.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when a field is missing, an encrypted field is not
    /// text, or encryption fails.
    pub fn column_values(
        &self,
        writable_only: bool,
        encryptor: &Encryptor,
    ) -> Result<Vec<SqlValue>, DbError> {
        self.selected(writable_only)
            .map(|column| {
                let value = self.fields.get(column.field()).ok_or_else(|| {
                    DbError::MissingField {
                        table: self.schema.table(),
                        field: column.field().to_string(),
                    }
                })?;
                if !column.is_encrypted() {
                    return value.to_sql(column.field());
                }
                match value {
                    FieldValue::Null => Ok(SqlValue::Null),
                    FieldValue::Text(text) if text.is_empty() => Ok(SqlValue::Text(String::new())),
                    FieldValue::Text(text) => encryptor.encrypt(text).map(SqlValue::Text),
                    other => Err(DbError::Invalid(format!(
                        "encrypted field {} must be text, found {other}",
                        column.field()
                    ))),
                }
            })
            .collect()
    }

    /// Resolves a logical field name to its physical column name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownField`] when the field is not declared.
    pub fn resolve(&self, field: &str) -> Result<&str, DbError> {
        self.schema.resolve(field)
    }

    /// Iterates columns, optionally skipping read-only ones.
    fn selected(&self, writable_only: bool) -> impl Iterator<Item = &ColumnDef> {
        self.schema.columns().iter().filter(move |column| !(writable_only && column.is_read_only()))
    }
}

// ============================================================================
// SECTION: Row Reading
// ============================================================================

/// Reads a result row whose columns follow the schema's column order.
///
/// # Errors
///
/// Returns [`DbError`] when a column cannot be read, a required encrypted
/// column fails to decrypt, or a value does not match its declared kind.
pub fn read_row(
    schema: &'static EntitySchema,
    row: &Row<'_>,
    encryptor: &Encryptor,
    events: &dyn StoreEventSink,
) -> Result<FieldMap, DbError> {
    let mut fields = FieldMap::new();
    for (index, column) in schema.columns().iter().enumerate() {
        let raw: SqlValue = row.get(index)?;
        let raw = if column.is_encrypted() {
            open_column(schema, column, raw, encryptor, events)?
        } else {
            raw
        };
        let value = FieldValue::from_sql(column.field(), column.kind(), raw)?;
        fields.insert(column.field(), value);
    }
    Ok(fields)
}

/// Decrypts one stored column value.
fn open_column(
    schema: &EntitySchema,
    column: &ColumnDef,
    raw: SqlValue,
    encryptor: &Encryptor,
    events: &dyn StoreEventSink,
) -> Result<SqlValue, DbError> {
    let SqlValue::Text(stored) = raw else {
        return Ok(raw);
    };
    if stored.is_empty() || column.kind() != FieldKind::Text {
        return Ok(SqlValue::Text(stored));
    }
    let failure = if encryptor.decryptable(&stored) {
        match encryptor.decrypt(&stored) {
            Ok(plain) => return Ok(SqlValue::Text(plain)),
            Err(err) => err,
        }
    } else {
        DbError::Decryption(format!(
            "{}.{} was not encrypted with key {}",
            schema.table(),
            column.column(),
            encryptor.key_id()
        ))
    };
    if column.is_required() {
        return Err(failure);
    }
    events.record(
        &StoreEvent::new("decryption_fallback", EventLevel::Warn)
            .table(schema.table())
            .message(format!("{}: {failure}", column.column())),
    );
    Ok(SqlValue::Text(stored))
}
