// crates/layerconf-db/src/database.rs
// ============================================================================
// Module: Database
// Description: SQLite connection, schema bootstrap and transactions.
// Purpose: Run units of work atomically against a single durable store.
// Dependencies: rusqlite, serde, crate::encryption, crate::events
// ============================================================================

//! ## Overview
//! [`Database`] owns one `SQLite` connection behind a mutex. Writes run inside
//! [`Database::transaction`] or [`Database::transaction_result`], which take
//! the write lock up front (`BEGIN IMMEDIATE`) and hand the caller a
//! [`Session`]. The session is the only way statements reach the
//! connection, so every statement issued by a unit of work shares its
//! transaction. Returning an error rolls back; a rollback failure is
//! attached to the original error rather than replacing it.
//!
//! Security posture: the store path comes from configuration and is
//! validated for length and shape before the file is opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use serde::Deserialize;

use crate::column::read_row;
use crate::encryption::Encryptor;
use crate::error::DbError;
use crate::events::EventLevel;
use crate::events::StoreEvent;
use crate::events::StoreEventSink;
use crate::field::FieldMap;
use crate::query::Statement;
use crate::schema::EntitySchema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Connection settings for the configuration store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl DatabaseConfig {
    /// Creates a config for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
        }
    }

    /// Validates the configured path without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Invalid`] when the path is empty or too long.
    pub fn validate(&self) -> Result<(), DbError> {
        validate_path_limits(&self.path)
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Versioned DDL for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSchema {
    /// Schema version recorded in `store_meta`.
    pub version: i64,
    /// Statements creating every table and index.
    pub ddl: &'static str,
}

// ============================================================================
// SECTION: Transaction Errors
// ============================================================================

/// Error types that units of work may return from a transaction.
pub trait TransactionError: From<DbError> {
    /// Attaches a rollback failure to the error that caused the rollback.
    #[must_use]
    fn with_rollback_failure(self, rollback: DbError) -> Self;
}

impl TransactionError for DbError {
    fn with_rollback_failure(self, rollback: DbError) -> Self {
        Self::Rollback {
            source: Box::new(self),
            rollback: rollback.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Database
// ============================================================================

/// Shared handle to the configuration store.
#[derive(Clone)]
pub struct Database {
    /// Connection guarded for serialized access.
    connection: Arc<Mutex<Connection>>,
    /// Column encryptor.
    encryptor: Arc<Encryptor>,
    /// Event sink.
    events: Arc<dyn StoreEventSink>,
    /// Database file path.
    path: PathBuf,
}

impl Database {
    /// Opens (creating when absent) the store and bootstraps its schema.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the path is invalid, the file cannot be
    /// opened, or an existing store has a different schema version.
    pub fn open(
        config: &DatabaseConfig,
        encryptor: Encryptor,
        events: Arc<dyn StoreEventSink>,
        schema: &StoreSchema,
    ) -> Result<Self, DbError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection, schema)?;
        events.record(
            &StoreEvent::new("store_opened", EventLevel::Info).message(format!(
                "{} (schema version {})",
                config.path.display(),
                schema.version
            )),
        );
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            encryptor: Arc::new(encryptor),
            events,
            path: config.path.clone(),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the column encryptor.
    #[must_use]
    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &dyn StoreEventSink {
        self.events.as_ref()
    }

    /// Runs `work` in an immediate transaction and returns its value.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back when
    /// it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work` (with any rollback failure
    /// attached), or a storage error when the transaction cannot begin or
    /// commit.
    pub fn transaction_result<T, E, F>(&self, operation: &str, work: F) -> Result<T, E>
    where
        E: TransactionError,
        F: FnOnce(&Session<'_>) -> Result<T, E>,
    {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| DbError::Db(err.to_string()))?;
        self.record_tx("transaction_begin", operation);
        let outcome = {
            let session = self.session(&tx, operation);
            work(&session)
        };
        match outcome {
            Ok(value) => {
                tx.commit().map_err(|err| DbError::Db(err.to_string()))?;
                self.record_tx("transaction_commit", operation);
                Ok(value)
            }
            Err(err) => match tx.rollback() {
                Ok(()) => {
                    self.record_tx("transaction_rollback", operation);
                    Err(err)
                }
                Err(rollback) => {
                    self.events.record(
                        &StoreEvent::new("rollback_failed", EventLevel::Warn)
                            .operation(operation)
                            .message(rollback.to_string()),
                    );
                    Err(err.with_rollback_failure(DbError::Db(rollback.to_string())))
                }
            },
        }
    }

    /// Runs `work` in an immediate transaction.
    ///
    /// # Errors
    ///
    /// Same as [`Database::transaction_result`].
    pub fn transaction<E, F>(&self, operation: &str, work: F) -> Result<(), E>
    where
        E: TransactionError,
        F: FnOnce(&Session<'_>) -> Result<(), E>,
    {
        self.transaction_result(operation, work)
    }

    /// Runs read-only `work` against a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or a storage error when the
    /// snapshot cannot be opened.
    pub fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&Session<'_>) -> Result<T, E>,
    {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| DbError::Db(err.to_string()))?;
        let outcome = {
            let session = self.session(&tx, "read");
            work(&session)
        };
        tx.commit().map_err(|err| DbError::Db(err.to_string()))?;
        outcome
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.connection.lock().map_err(|_| DbError::Db("mutex poisoned".to_string()))
    }

    /// Builds a session over an open transaction.
    fn session<'c>(&'c self, connection: &'c Connection, operation: &'c str) -> Session<'c> {
        Session {
            connection,
            encryptor: &self.encryptor,
            events: self.events.as_ref(),
            operation,
        }
    }

    /// Records a transaction lifecycle event.
    fn record_tx(&self, event: &'static str, operation: &str) {
        self.events.record(&StoreEvent::new(event, EventLevel::Debug).operation(operation));
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("encryptor", &self.encryptor)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Statement executor bound to one open transaction.
pub struct Session<'c> {
    /// Transaction connection.
    connection: &'c Connection,
    /// Column encryptor.
    encryptor: &'c Encryptor,
    /// Event sink.
    events: &'c dyn StoreEventSink,
    /// Operation label of the unit of work.
    operation: &'c str,
}

impl Session<'_> {
    /// Returns the column encryptor.
    #[must_use]
    pub const fn encryptor(&self) -> &Encryptor {
        self.encryptor
    }

    /// Returns the operation label.
    #[must_use]
    pub const fn operation(&self) -> &str {
        self.operation
    }

    /// Records an event tagged with this session's operation.
    pub fn record(&self, event: StoreEvent) {
        self.events.record(&event.operation(self.operation));
    }

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Db`] when execution fails.
    pub fn execute(&self, statement: &Statement) -> Result<usize, DbError> {
        self.trace(statement);
        Ok(self.connection.execute(&statement.sql, params_from_iter(statement.args.iter()))?)
    }

    /// Runs a statement whose result columns follow `schema`'s column order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when execution fails or a row cannot be decoded.
    pub fn query(
        &self,
        schema: &'static EntitySchema,
        statement: &Statement,
    ) -> Result<Vec<FieldMap>, DbError> {
        self.trace(statement);
        let mut prepared = self.connection.prepare(&statement.sql)?;
        let mut rows = prepared.query(params_from_iter(statement.args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(schema, row, self.encryptor, self.events)?);
        }
        Ok(out)
    }

    /// Records a statement trace event without argument values.
    fn trace(&self, statement: &Statement) {
        self.events.record(
            &StoreEvent::new("statement", EventLevel::Debug)
                .operation(self.operation)
                .message(statement.sql.clone())
                .count(statement.args.len()),
        );
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), DbError> {
    let Some(parent) = path.parent() else {
        return Err(DbError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| DbError::Io(err.to_string()))
}

/// Validates path length limits.
fn validate_path_limits(path: &Path) -> Result<(), DbError> {
    if path.as_os_str().is_empty() {
        return Err(DbError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(DbError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(DbError::Invalid("store path contains an overlong component".to_string()));
        }
    }
    Ok(())
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), DbError> {
    validate_path_limits(path)?;
    if path.is_dir() {
        return Err(DbError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &DatabaseConfig) -> Result<Connection, DbError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| DbError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &DatabaseConfig) -> Result<(), DbError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| DbError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| DbError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| DbError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| DbError::Db(err.to_string()))?;
    Ok(())
}

/// Creates the schema on first open or validates the recorded version.
fn initialize_schema(connection: &mut Connection, schema: &StoreSchema) -> Result<(), DbError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| DbError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| DbError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| DbError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![schema.version])
                .map_err(|err| DbError::Db(err.to_string()))?;
            tx.execute_batch(schema.ddl).map_err(|err| DbError::Db(err.to_string()))?;
        }
        Some(found) if found == schema.version => {}
        Some(found) => {
            return Err(DbError::VersionMismatch(format!(
                "store schema version {found} does not match expected {}",
                schema.version
            )));
        }
    }
    tx.commit().map_err(|err| DbError::Db(err.to_string()))
}
