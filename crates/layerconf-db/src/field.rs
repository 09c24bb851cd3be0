// crates/layerconf-db/src/field.rs
// ============================================================================
// Module: Field Values
// Description: Typed field values and logical field maps.
// Purpose: Carry record data between entities, converters and SQL.
// Dependencies: rusqlite, time, crate::schema, crate::error
// ============================================================================

//! ## Overview
//! [`FieldValue`] is the typed representation of a single field. It converts
//! to and from `SQLite` values according to the declared [`FieldKind`].
//! [`FieldMap`] holds one record as logical field name to value; it is what
//! the marshaller produces and what record types consume.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use rusqlite::types::Value as SqlValue;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::DbError;
use crate::schema::FieldKind;

// ============================================================================
// SECTION: Field Value
// ============================================================================

/// Typed value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// UTF-8 text.
    Text(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// Boolean.
    Bool(bool),
    /// UTC timestamp.
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    /// Returns true when the value counts as empty for required-field checks.
    ///
    /// Booleans and timestamps are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.is_empty(),
            Self::Integer(value) => *value == 0,
            Self::Real(value) => *value == 0.0,
            Self::Bool(_) | Self::Timestamp(_) => false,
        }
    }

    /// Returns the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Converts the value to an `SQLite` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when a timestamp cannot be formatted.
    pub fn to_sql(&self, field: &str) -> Result<SqlValue, DbError> {
        match self {
            Self::Null => Ok(SqlValue::Null),
            Self::Text(value) => Ok(SqlValue::Text(value.clone())),
            Self::Integer(value) => Ok(SqlValue::Integer(*value)),
            Self::Real(value) => Ok(SqlValue::Real(*value)),
            Self::Bool(value) => Ok(SqlValue::Integer(i64::from(*value))),
            Self::Timestamp(value) => value.format(&Rfc3339).map(SqlValue::Text).map_err(|err| {
                DbError::Conversion {
                    field: field.to_string(),
                    message: err.to_string(),
                }
            }),
        }
    }

    /// Decodes an `SQLite` column value according to the declared kind.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conversion`] when the stored value does not match
    /// the declared kind.
    pub fn from_sql(field: &str, kind: FieldKind, value: SqlValue) -> Result<Self, DbError> {
        let mismatch = |found: &str| DbError::Conversion {
            field: field.to_string(),
            message: format!("expected {} column, found {found}", kind.as_str()),
        };
        match (kind, value) {
            (_, SqlValue::Null) => Ok(Self::Null),
            (FieldKind::Text, SqlValue::Text(text)) => Ok(Self::Text(text)),
            (FieldKind::Integer, SqlValue::Integer(number)) => Ok(Self::Integer(number)),
            (FieldKind::Real, SqlValue::Real(number)) => Ok(Self::Real(number)),
            (FieldKind::Boolean, SqlValue::Integer(number)) => Ok(Self::Bool(number != 0)),
            (FieldKind::Timestamp, SqlValue::Text(text)) => OffsetDateTime::parse(&text, &Rfc3339)
                .map(Self::Timestamp)
                .map_err(|err| DbError::Conversion {
                    field: field.to_string(),
                    message: format!("invalid timestamp {text}: {err}"),
                }),
            (_, SqlValue::Text(_)) => Err(mismatch("text")),
            (_, SqlValue::Integer(_)) => Err(mismatch("integer")),
            (_, SqlValue::Real(_)) => Err(mismatch("real")),
            (_, SqlValue::Blob(_)) => Err(mismatch("blob")),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Timestamp(value) => match value.format(&Rfc3339) {
                Ok(text) => f.write_str(&text),
                Err(_) => f.write_str("<timestamp>"),
            },
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// SECTION: Field Map
// ============================================================================

/// Logical field name to value mapping for one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    /// Field values keyed by logical name.
    values: BTreeMap<&'static str, FieldValue>,
}

impl FieldMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Adds a field, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    /// Inserts or replaces a field value.
    pub fn insert(&mut self, field: &'static str, value: FieldValue) {
        self.values.insert(field, value);
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Returns true when the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, &'static str, FieldValue> {
        self.values.iter()
    }

    /// Removes and returns a field value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingField`] when the field is absent.
    pub fn take(&mut self, table: &'static str, field: &str) -> Result<FieldValue, DbError> {
        self.values.remove(field).ok_or_else(|| DbError::MissingField {
            table,
            field: field.to_string(),
        })
    }

    /// Removes a text field; null becomes the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the field is absent or not text.
    pub fn take_text(&mut self, table: &'static str, field: &str) -> Result<String, DbError> {
        match self.take(table, field)? {
            FieldValue::Text(value) => Ok(value),
            FieldValue::Null => Ok(String::new()),
            other => Err(wrong_type(field, "text", &other)),
        }
    }

    /// Removes a text field; null and empty become `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the field is absent or not text.
    pub fn take_optional_text(
        &mut self,
        table: &'static str,
        field: &str,
    ) -> Result<Option<String>, DbError> {
        let value = self.take_text(table, field)?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    /// Removes an integer field; null becomes zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the field is absent or not an integer.
    pub fn take_integer(&mut self, table: &'static str, field: &str) -> Result<i64, DbError> {
        match self.take(table, field)? {
            FieldValue::Integer(value) => Ok(value),
            FieldValue::Null => Ok(0),
            other => Err(wrong_type(field, "integer", &other)),
        }
    }

    /// Removes a boolean field; null becomes false.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the field is absent or not a boolean.
    pub fn take_bool(&mut self, table: &'static str, field: &str) -> Result<bool, DbError> {
        match self.take(table, field)? {
            FieldValue::Bool(value) => Ok(value),
            FieldValue::Null => Ok(false),
            other => Err(wrong_type(field, "boolean", &other)),
        }
    }

    /// Removes a timestamp field; null becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the field is absent or not a timestamp.
    pub fn take_timestamp(
        &mut self,
        table: &'static str,
        field: &str,
    ) -> Result<Option<OffsetDateTime>, DbError> {
        match self.take(table, field)? {
            FieldValue::Timestamp(value) => Ok(Some(value)),
            FieldValue::Null => Ok(None),
            other => Err(wrong_type(field, "timestamp", &other)),
        }
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = (&'a &'static str, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, &'static str, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Builds a type mismatch error for a field accessor.
fn wrong_type(field: &str, expected: &str, found: &FieldValue) -> DbError {
    DbError::Conversion {
        field: field.to_string(),
        message: format!("expected {expected}, found {found}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
