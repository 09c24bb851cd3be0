// crates/layerconf-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Error type for configuration store operations.
// Purpose: Separate bad data, bad rules and storage failures by kind.
// Dependencies: thiserror, layerconf-db, layerconf-expr, layerconf-config
// ============================================================================

//! ## Overview
//! [`StoreError`] wraps entity-layer failures and adds the domain errors of
//! the key/value store. Callers branch on [`StoreError::kind`], which reuses
//! the entity layer's [`ErrorKind`] tags. A validator that evaluates to false
//! is a `Validation` error; a validator that cannot be evaluated at all is a
//! `Parse` error.

use layerconf_config::ConfigError;
use layerconf_db::DbError;
use layerconf_db::ErrorKind;
use layerconf_db::TransactionError;
use layerconf_expr::ExprError;
use thiserror::Error;

use crate::model::DataType;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Value declares a data type other than its key's.
    #[error(
        "value of key '{key}' declares data type {invalid_data_type} but the key expects {expected}"
    )]
    InvalidDataType {
        /// Key name.
        key: String,
        /// Data type declared by the value.
        invalid_data_type: DataType,
        /// Data type declared by the key.
        expected: DataType,
    },
    /// Payload is not a literal of the key's data type.
    #[error("key '{key}' expects a value of type {data_type}: provided value was '{value}'")]
    Parse {
        /// Key name.
        key: String,
        /// Expected data type.
        data_type: DataType,
        /// Rejected payload.
        value: String,
    },
    /// Validator expression could not be evaluated.
    #[error("validation rule of key '{key}' cannot be evaluated: {source}")]
    Rule {
        /// Key name.
        key: String,
        /// Expression failure.
        source: ExprError,
    },
    /// Validator evaluated to false.
    #[error("validation defined in key '{key}' failed for value '{value}'")]
    Validation {
        /// Key name.
        key: String,
        /// Rejected payload.
        value: String,
        /// Validator expression.
        validator: String,
    },
    /// Merge input names an unknown override layer.
    #[error("merge layer '{layer}' is not supported (use landscape, customer, cluster or feature)")]
    InvalidMergeLayer {
        /// Rejected layer name.
        layer: String,
    },
    /// Bucket name does not follow the naming pattern.
    #[error("bucket name '{0}' is invalid")]
    InvalidBucket(String),
    /// Stored value contradicts its own metadata.
    #[error("bucket '{bucket}' holds an inconsistent value for key '{key}': {message}")]
    DataInconsistency {
        /// Bucket holding the value.
        bucket: String,
        /// Key name.
        key: String,
        /// Decode failure.
        message: String,
    },
    /// Listing could not be rendered.
    #[error("listing render failed: {0}")]
    Render(String),
    /// Service configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Entity layer failure.
    #[error(transparent)]
    Db(#[from] DbError),
    /// Work failed and the rollback failed too.
    #[error("{source} (rollback failed: {rollback})")]
    Rollback {
        /// Error that caused the rollback.
        source: Box<Self>,
        /// Rollback failure message.
        rollback: String,
    },
}

impl StoreError {
    /// Returns the stable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDataType {
                ..
            } => ErrorKind::InvalidDataType,
            Self::Parse {
                ..
            }
            | Self::Rule {
                ..
            } => ErrorKind::Parse,
            Self::Validation {
                ..
            } => ErrorKind::Validation,
            Self::DataInconsistency {
                ..
            } => ErrorKind::DataInconsistency,
            Self::InvalidMergeLayer {
                ..
            }
            | Self::InvalidBucket(_)
            | Self::Render(_)
            | Self::Config(_) => ErrorKind::Invalid,
            Self::Db(err) => err.kind(),
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
}

impl TransactionError for StoreError {
    fn with_rollback_failure(self, rollback: DbError) -> Self {
        match self {
            Self::Db(err) => Self::Db(err.with_rollback_failure(rollback)),
            other => Self::Rollback {
                source: Box::new(other),
                rollback: rollback.to_string(),
            },
        }
    }
}

/// Maps a not-found lookup to `None`.
pub(crate) fn found<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
