// crates/layerconf-db/src/error.rs
// ============================================================================
// Module: DB Errors
// Description: Error type and stable error classification for the DB layer.
// Purpose: Let callers branch on failure categories without type switches.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`DbError`] carries operation context as strings, mirroring how the
//! storage engine reports failures. [`ErrorKind`] is the stable tag callers
//! match on; higher layers reuse it for their own error types.

use thiserror::Error;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Stable classification of persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Required fields were empty.
    IncompleteEntity,
    /// Lookup matched no row.
    NotFound,
    /// Value data type disagrees with its key.
    InvalidDataType,
    /// Value was rejected by its key's validator.
    Validation,
    /// Value or rule could not be parsed.
    Parse,
    /// Stored ciphertext could not be decrypted.
    Decryption,
    /// Stored data contradicts its own metadata.
    DataInconsistency,
    /// Caller supplied an invalid argument or the schema is misused.
    Invalid,
    /// Storage engine or I/O failure.
    Storage,
}

impl ErrorKind {
    /// Returns the kind label used in events and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteEntity => "incomplete_entity",
            Self::NotFound => "not_found",
            Self::InvalidDataType => "invalid_data_type",
            Self::Validation => "validation",
            Self::Parse => "parse",
            Self::Decryption => "decryption",
            Self::DataInconsistency => "data_inconsistency",
            Self::Invalid => "invalid",
            Self::Storage => "storage",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the entity layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Required fields are empty.
    #[error("incomplete entity for table {table}: empty required fields [{}]", .fields.join(", "))]
    IncompleteEntity {
        /// Target table.
        table: &'static str,
        /// Logical names of the empty required fields.
        fields: Vec<String>,
    },
    /// Query matched no row.
    #[error("no {table} row matches {selector}")]
    NotFound {
        /// Queried table.
        table: &'static str,
        /// Rendered filter description.
        selector: String,
    },
    /// Field is not declared by the entity schema.
    #[error("table {table} declares no field {field}")]
    UnknownField {
        /// Entity table.
        table: &'static str,
        /// Unknown logical field name.
        field: String,
    },
    /// Field map lacks a declared field.
    #[error("field {field} missing for table {table}")]
    MissingField {
        /// Entity table.
        table: &'static str,
        /// Missing logical field name.
        field: String,
    },
    /// Field converter or type coercion failed.
    #[error("field {field} conversion failed: {message}")]
    Conversion {
        /// Logical field name.
        field: String,
        /// Converter message.
        message: String,
    },
    /// Encryption failed or the key is unusable.
    #[error("encryption error: {0}")]
    Encryption(String),
    /// Ciphertext could not be decrypted.
    #[error("decryption error: {0}")]
    Decryption(String),
    /// Filesystem error.
    #[error("database io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("database error: {0}")]
    Db(String),
    /// Stored schema version is not supported.
    #[error("database schema version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid argument or schema misuse.
    #[error("invalid database request: {0}")]
    Invalid(String),
    /// Work failed and the rollback failed too.
    #[error("{source} (rollback failed: {rollback})")]
    Rollback {
        /// Error that caused the rollback.
        source: Box<Self>,
        /// Rollback failure message.
        rollback: String,
    },
}

impl DbError {
    /// Returns the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompleteEntity {
                ..
            } => ErrorKind::IncompleteEntity,
            Self::NotFound {
                ..
            } => ErrorKind::NotFound,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::UnknownField {
                ..
            }
            | Self::MissingField {
                ..
            }
            | Self::Conversion {
                ..
            }
            | Self::Encryption(_)
            | Self::Invalid(_) => ErrorKind::Invalid,
            Self::Io(_) | Self::Db(_) | Self::VersionMismatch(_) => ErrorKind::Storage,
            Self::Rollback {
                source, ..
            } => source.kind(),
        }
    }

    /// Returns true when the error is a not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true when required fields were empty.
    #[must_use]
    pub fn is_incomplete_entity(&self) -> bool {
        self.kind() == ErrorKind::IncompleteEntity
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}
