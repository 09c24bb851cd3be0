// crates/layerconf-db/src/schema.rs
// ============================================================================
// Module: Entity Schema
// Description: Static per-entity column metadata.
// Purpose: Declare table layout, field flags and converters once per type.
// Dependencies: crate::field, crate::error
// ============================================================================

//! ## Overview
//! An [`EntitySchema`] lists the columns of one table in a fixed order. Each
//! [`ColumnDef`] pairs a logical field name (as used by the record type) with
//! its physical column name, derived by [`to_snake_case`]. Flags mark fields
//! as required, storage-assigned (read-only) or encrypted at rest. Schemas
//! are built once and shared as `&'static` references, typically from a
//! `LazyLock`.

use crate::error::DbError;
use crate::field::FieldValue;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Per-field conversion applied by the marshaller.
///
/// Returns a human-readable message on failure; the marshaller attaches the
/// field name.
pub type FieldConverter = fn(FieldValue) -> Result<FieldValue, String>;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// Boolean stored as 0/1.
    Boolean,
    /// RFC 3339 UTC timestamp stored as text.
    Timestamp,
}

impl FieldKind {
    /// Returns the kind label used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Column declaration within an entity schema.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// Logical field name.
    field: &'static str,
    /// Physical column name.
    column: String,
    /// Semantic type.
    kind: FieldKind,
    /// Empty values are rejected on write.
    required: bool,
    /// Value is assigned by storage and never written.
    read_only: bool,
    /// Value is encrypted at rest.
    encrypted: bool,
    /// Converter applied on marshal.
    marshaller: Option<FieldConverter>,
    /// Converter applied on unmarshal.
    unmarshaller: Option<FieldConverter>,
}

impl ColumnDef {
    /// Declares a column for the logical field name.
    #[must_use]
    pub fn new(field: &'static str, kind: FieldKind) -> Self {
        Self {
            field,
            column: to_snake_case(field),
            kind,
            required: false,
            read_only: false,
            encrypted: false,
            marshaller: None,
            unmarshaller: None,
        }
    }

    /// Declares a text column.
    #[must_use]
    pub fn text(field: &'static str) -> Self {
        Self::new(field, FieldKind::Text)
    }

    /// Declares an integer column.
    #[must_use]
    pub fn integer(field: &'static str) -> Self {
        Self::new(field, FieldKind::Integer)
    }

    /// Declares a boolean column.
    #[must_use]
    pub fn boolean(field: &'static str) -> Self {
        Self::new(field, FieldKind::Boolean)
    }

    /// Declares a timestamp column.
    #[must_use]
    pub fn timestamp(field: &'static str) -> Self {
        Self::new(field, FieldKind::Timestamp)
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as storage-assigned.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Marks the field as encrypted at rest.
    #[must_use]
    pub const fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Registers the converter applied on marshal.
    #[must_use]
    pub const fn marshal_with(mut self, converter: FieldConverter) -> Self {
        self.marshaller = Some(converter);
        self
    }

    /// Registers the converter applied on unmarshal.
    #[must_use]
    pub const fn unmarshal_with(mut self, converter: FieldConverter) -> Self {
        self.unmarshaller = Some(converter);
        self
    }

    /// Returns the logical field name.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        self.field
    }

    /// Returns the physical column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the semantic type.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Returns true when empty values are rejected.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns true when the value is storage-assigned.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns true when the value is encrypted at rest.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Returns the declared marshal converter.
    #[must_use]
    pub const fn marshaller(&self) -> Option<FieldConverter> {
        self.marshaller
    }

    /// Returns the declared unmarshal converter.
    #[must_use]
    pub const fn unmarshaller(&self) -> Option<FieldConverter> {
        self.unmarshaller
    }
}

/// Storage-assigned version counter.
#[derive(Debug, Clone)]
struct Sequence {
    /// Logical field holding the counter.
    field: &'static str,
    /// Logical fields the counter is partitioned by.
    partition: Vec<&'static str>,
}

/// Static description of one table.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Physical table name.
    table: &'static str,
    /// Columns in select order.
    columns: Vec<ColumnDef>,
    /// Optional version sequence.
    sequence: Option<Sequence>,
}

impl EntitySchema {
    /// Starts a schema for the physical table.
    #[must_use]
    pub const fn builder(table: &'static str) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            schema: Self {
                table,
                columns: Vec::new(),
                sequence: None,
            },
        }
    }

    /// Returns the physical table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.table
    }

    /// Returns all columns in select order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the column declaration for a logical field.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownField`] when the field is not declared.
    pub fn column(&self, field: &str) -> Result<&ColumnDef, DbError> {
        self.columns.iter().find(|column| column.field == field).ok_or_else(|| {
            DbError::UnknownField {
                table: self.table,
                field: field.to_string(),
            }
        })
    }

    /// Resolves a logical field name to its physical column name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownField`] when the field is not declared.
    pub fn resolve(&self, field: &str) -> Result<&str, DbError> {
        self.column(field).map(ColumnDef::column)
    }

    /// Returns the sequence field and its partition, if declared.
    #[must_use]
    pub fn sequence(&self) -> Option<(&'static str, &[&'static str])> {
        self.sequence.as_ref().map(|sequence| (sequence.field, sequence.partition.as_slice()))
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    /// Schema under construction.
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.schema.columns.push(column);
        self
    }

    /// Declares `field` as a per-partition version counter assigned on insert
    /// as `MAX(field) + 1` over rows sharing the `partition` fields.
    #[must_use]
    pub fn sequence(mut self, field: &'static str, partition: &[&'static str]) -> Self {
        self.schema.sequence = Some(Sequence {
            field,
            partition: partition.to_vec(),
        });
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn build(self) -> EntitySchema {
        self.schema
    }
}

// ============================================================================
// SECTION: Naming
// ============================================================================

/// Converts a mixed-case field name to its lower-case, underscore-separated
/// column name.
///
/// An underscore is inserted before an upper-case letter that follows a
/// lower-case letter or digit, or that starts a new word after an acronym
/// (`KeyVersion` becomes `key_version`, `CacheID` becomes `cache_id`,
/// `HTTPServer` becomes `http_server`).
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (index, ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && index > 0 {
            let previous = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            let boundary = previous.is_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
