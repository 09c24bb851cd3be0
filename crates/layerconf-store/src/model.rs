// crates/layerconf-store/src/model.rs
// ============================================================================
// Module: Store Model
// Description: Key, value, bucket and cache records with their schemas.
// Purpose: Declare the persisted configuration model once per record type.
// Dependencies: layerconf-db, layerconf-expr, regex, sha2, hex, serde, time
// ============================================================================

//! ## Overview
//! Keys and values are append-only: every write of differing content adds a
//! row with the next storage-assigned version. Values live in buckets whose
//! names follow a fixed pattern (`default` or dash-separated lower-case
//! words). Cache entries hold computed artifacts; cache dependencies record
//! which `(bucket, key)` pairs an entry was derived from.
//!
//! Payloads of values and cache entries are encrypted at rest. Data types are
//! stored as lower-case labels and normalized through field converters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use layerconf_db::ColumnDef;
use layerconf_db::DbError;
use layerconf_db::Entity;
use layerconf_db::EntitySchema;
use layerconf_db::FieldMap;
use layerconf_db::FieldValue;
use layerconf_db::StoreSchema;
use layerconf_expr::Value;
use layerconf_expr::evaluate_bool;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bucket every merge starts from.
pub const DEFAULT_BUCKET: &str = "default";

/// Override layers applied on top of the default bucket, in merge order.
pub const OVERRIDE_LAYERS: [&str; 4] = ["landscape", "customer", "cluster", "feature"];

/// Table holding key versions.
pub const KEYS_TABLE: &str = "config_keys";

/// Table holding value versions.
pub const VALUES_TABLE: &str = "config_values";

/// Table holding cache entries.
pub const CACHE_TABLE: &str = "config_cache";

/// Table holding cache dependencies.
pub const CACHE_DEPS_TABLE: &str = "config_cachedeps";

/// Accepted bucket names.
const BUCKET_PATTERN_SOURCE: &str = r"^(default|[a-z0-9]+(-[a-z0-9]+)+)$";

/// Compiled bucket pattern; `None` rejects every name.
static BUCKET_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(BUCKET_PATTERN_SOURCE).ok());

/// Returns true when `name` is a valid bucket name.
#[must_use]
pub fn is_valid_bucket_name(name: &str) -> bool {
    BUCKET_PATTERN.as_ref().is_some_and(|pattern| pattern.is_match(name))
}

// ============================================================================
// SECTION: Data Types
// ============================================================================

/// Declared type of a key's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Raw text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean accepting `1, t, true, 0, f, false`.
    Boolean,
}

impl DataType {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Decodes a raw payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] when `raw` is not a valid literal of
    /// this type.
    pub fn decode(self, key: &str, raw: &str) -> Result<Value, StoreError> {
        let rejected = || StoreError::Parse {
            key: key.to_string(),
            data_type: self,
            value: raw.to_string(),
        };
        match self {
            Self::String => Ok(Value::Str(raw.to_string())),
            Self::Integer => raw.parse::<i64>().map(Value::Int).map_err(|_| rejected()),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(Value::Bool(true)),
                "0" | "f" | "false" => Ok(Value::Bool(false)),
                _ => Err(rejected()),
            },
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            _ => Err(format!("data type '{value}' is not supported")),
        }
    }
}

/// Normalizes stored data type labels; empty and null pass through.
fn normalize_data_type(value: FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Text(text) if !text.is_empty() => {
            text.parse::<DataType>().map(|data_type| FieldValue::from(data_type.as_str()))
        }
        other => Ok(other),
    }
}

/// Rejects malformed bucket names; empty values are left to the required
/// field check.
fn check_bucket_name(value: FieldValue) -> Result<FieldValue, String> {
    if let Some(name) = value.as_text()
        && !name.is_empty()
        && !is_valid_bucket_name(name)
    {
        return Err(format!(
            "bucket name '{name}' is invalid: use 'default' or dash-separated lower-case words"
        ));
    }
    Ok(value)
}

/// Reads a data type label from a field map.
fn take_data_type(
    fields: &mut FieldMap,
    table: &'static str,
) -> Result<Option<DataType>, DbError> {
    fields
        .take_optional_text(table, "DataType")?
        .map(|label| {
            label.parse::<DataType>().map_err(|message| DbError::Conversion {
                field: "DataType".to_string(),
                message,
            })
        })
        .transpose()
}

// ============================================================================
// SECTION: Keys
// ============================================================================

/// One version of a configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntity {
    /// Key name, shared by all versions.
    pub key: String,
    /// Storage-assigned version, starting at 1.
    pub version: i64,
    /// Declared value type.
    pub data_type: DataType,
    /// Values of this key are sensitive.
    pub encrypted: bool,
    /// Storage-assigned creation time.
    pub created: Option<OffsetDateTime>,
    /// Creating user.
    pub username: String,
    /// Boolean expression every value must satisfy.
    pub validator: Option<String>,
    /// Trigger label.
    pub trigger: Option<String>,
}

impl KeyEntity {
    /// Creates an unsaved key.
    #[must_use]
    pub fn new(key: impl Into<String>, data_type: DataType, username: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            data_type,
            encrypted: false,
            created: None,
            username: username.into(),
            validator: None,
            trigger: None,
        }
    }

    /// Sets the validation expression.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    /// Sets the trigger label.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Sets the encrypted flag.
    #[must_use]
    pub const fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Returns true when both versions carry the same definition.
    ///
    /// Version, creation time and user are not compared.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.key == other.key
            && self.data_type == other.data_type
            && self.encrypted == other.encrypted
            && self.validator == other.validator
            && self.trigger == other.trigger
    }

    /// Decodes `raw` per the key's data type and runs its validator with
    /// `it` and `value` bound to the typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] when the payload does not decode,
    /// [`StoreError::Rule`] when the validator cannot be evaluated and
    /// [`StoreError::Validation`] when it evaluates to false.
    pub fn validate(&self, raw: &str) -> Result<Value, StoreError> {
        let typed = self.data_type.decode(&self.key, raw)?;
        let Some(rule) = self.validator.as_deref().filter(|rule| !rule.trim().is_empty()) else {
            return Ok(typed);
        };
        let mut bindings = BTreeMap::new();
        bindings.insert("it".to_string(), typed.clone());
        bindings.insert("value".to_string(), typed.clone());
        match evaluate_bool(rule, &bindings) {
            Ok(true) => Ok(typed),
            Ok(false) => Err(StoreError::Validation {
                key: self.key.clone(),
                value: raw.to_string(),
                validator: rule.to_string(),
            }),
            Err(source) => Err(StoreError::Rule {
                key: self.key.clone(),
                source,
            }),
        }
    }
}

/// Schema of [`KeyEntity`].
static KEY_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(KEYS_TABLE)
        .column(ColumnDef::text("Key").required())
        .column(ColumnDef::integer("Version").read_only())
        .column(
            ColumnDef::text("DataType")
                .required()
                .marshal_with(normalize_data_type)
                .unmarshal_with(normalize_data_type),
        )
        .column(ColumnDef::boolean("Encrypted"))
        .column(ColumnDef::timestamp("Created").read_only())
        .column(ColumnDef::text("Username").required())
        .column(ColumnDef::text("Validator"))
        .column(ColumnDef::text("Trigger"))
        .sequence("Version", &["Key"])
        .build()
});

impl Entity for KeyEntity {
    fn schema() -> &'static EntitySchema {
        &KEY_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("Key", &self.key)
            .with("Version", self.version)
            .with("DataType", self.data_type.as_str())
            .with("Encrypted", self.encrypted)
            .with("Created", self.created)
            .with("Username", &self.username)
            .with("Validator", self.validator.clone())
            .with("Trigger", self.trigger.clone())
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        let data_type = take_data_type(&mut fields, KEYS_TABLE)?.ok_or_else(|| {
            DbError::Conversion {
                field: "DataType".to_string(),
                message: "key without data type".to_string(),
            }
        })?;
        Ok(Self {
            key: fields.take_text(KEYS_TABLE, "Key")?,
            version: fields.take_integer(KEYS_TABLE, "Version")?,
            data_type,
            encrypted: fields.take_bool(KEYS_TABLE, "Encrypted")?,
            created: fields.take_timestamp(KEYS_TABLE, "Created")?,
            username: fields.take_text(KEYS_TABLE, "Username")?,
            validator: fields.take_optional_text(KEYS_TABLE, "Validator")?,
            trigger: fields.take_optional_text(KEYS_TABLE, "Trigger")?,
        })
    }
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// One version of a key's value within a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntity {
    /// Key name.
    pub key: String,
    /// Key version the value was validated against.
    pub key_version: i64,
    /// Storage-assigned version per `(key, bucket)`, starting at 1.
    pub version: i64,
    /// Owning bucket.
    pub bucket: String,
    /// Raw payload.
    pub value: String,
    /// Payload type; unset defaults to the key's type on write.
    pub data_type: Option<DataType>,
    /// Storage-assigned creation time.
    pub created: Option<OffsetDateTime>,
    /// Creating user.
    pub username: String,
}

impl ValueEntity {
    /// Creates an unsaved value for `key` in `bucket`.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        key: &KeyEntity,
        value: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            key: key.key.clone(),
            key_version: key.version,
            version: 0,
            bucket: bucket.into(),
            value: value.into(),
            data_type: None,
            created: None,
            username: username.into(),
        }
    }

    /// Declares the payload type explicitly.
    #[must_use]
    pub const fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Returns true when both versions hold the same payload for the same
    /// key version and bucket.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.bucket == other.bucket
            && self.key == other.key
            && self.key_version == other.key_version
            && self.value == other.value
    }
}

/// Schema of [`ValueEntity`].
static VALUE_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(VALUES_TABLE)
        .column(ColumnDef::text("Key").required())
        .column(ColumnDef::integer("KeyVersion").required())
        .column(ColumnDef::integer("Version").read_only())
        .column(ColumnDef::text("Bucket").required().marshal_with(check_bucket_name))
        .column(ColumnDef::text("Value").required().encrypted())
        .column(
            ColumnDef::text("DataType")
                .required()
                .marshal_with(normalize_data_type)
                .unmarshal_with(normalize_data_type),
        )
        .column(ColumnDef::timestamp("Created").read_only())
        .column(ColumnDef::text("Username").required())
        .sequence("Version", &["Key", "Bucket"])
        .build()
});

impl Entity for ValueEntity {
    fn schema() -> &'static EntitySchema {
        &VALUE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("Key", &self.key)
            .with("KeyVersion", self.key_version)
            .with("Version", self.version)
            .with("Bucket", &self.bucket)
            .with("Value", &self.value)
            .with("DataType", self.data_type.map(DataType::as_str))
            .with("Created", self.created)
            .with("Username", &self.username)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            data_type: take_data_type(&mut fields, VALUES_TABLE)?,
            key: fields.take_text(VALUES_TABLE, "Key")?,
            key_version: fields.take_integer(VALUES_TABLE, "KeyVersion")?,
            version: fields.take_integer(VALUES_TABLE, "Version")?,
            bucket: fields.take_text(VALUES_TABLE, "Bucket")?,
            value: fields.take_text(VALUES_TABLE, "Value")?,
            created: fields.take_timestamp(VALUES_TABLE, "Created")?,
            username: fields.take_text(VALUES_TABLE, "Username")?,
        })
    }
}

// ============================================================================
// SECTION: Buckets
// ============================================================================

/// Bucket view derived from the values stored in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntity {
    /// Bucket name.
    pub bucket: String,
    /// Key of the bucket's earliest value.
    pub key: String,
    /// Version of the bucket's earliest value.
    pub version: i64,
    /// Creation time of the bucket's earliest value.
    pub created: Option<OffsetDateTime>,
    /// Creator of the bucket's earliest value.
    pub username: String,
}

/// Schema of [`BucketEntity`], a projection of the values table.
static BUCKET_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(VALUES_TABLE)
        .column(ColumnDef::text("Bucket").required())
        .column(ColumnDef::text("Key").required())
        .column(ColumnDef::integer("Version").read_only())
        .column(ColumnDef::timestamp("Created").read_only())
        .column(ColumnDef::text("Username").required())
        .build()
});

impl Entity for BucketEntity {
    fn schema() -> &'static EntitySchema {
        &BUCKET_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("Bucket", &self.bucket)
            .with("Key", &self.key)
            .with("Version", self.version)
            .with("Created", self.created)
            .with("Username", &self.username)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            bucket: fields.take_text(VALUES_TABLE, "Bucket")?,
            key: fields.take_text(VALUES_TABLE, "Key")?,
            version: fields.take_integer(VALUES_TABLE, "Version")?,
            created: fields.take_timestamp(VALUES_TABLE, "Created")?,
            username: fields.take_text(VALUES_TABLE, "Username")?,
        })
    }
}

/// Name-only view of the values table, one row per bucket under `DISTINCT`.
pub(crate) struct BucketNameEntity {
    /// Bucket name.
    pub(crate) bucket: String,
}

/// Schema of [`BucketNameEntity`].
static BUCKET_NAME_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(VALUES_TABLE).column(ColumnDef::text("Bucket").required()).build()
});

impl Entity for BucketNameEntity {
    fn schema() -> &'static EntitySchema {
        &BUCKET_NAME_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new().with("Bucket", &self.bucket)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            bucket: fields.take_text(VALUES_TABLE, "Bucket")?,
        })
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Computed artifact cached under `(label, scope)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryEntity {
    /// Storage-assigned identifier, never reused.
    pub id: i64,
    /// Artifact label.
    pub label: String,
    /// Scope the artifact was computed for.
    pub scope: String,
    /// Opaque payload.
    pub data: String,
    /// Storage-assigned creation time.
    pub created: Option<OffsetDateTime>,
}

impl CacheEntryEntity {
    /// Creates an unsaved cache entry.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        scope: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            label: label.into(),
            scope: scope.into(),
            data: data.into(),
            created: None,
        }
    }

    /// Returns the SHA-256 hex digest of the payload.
    #[must_use]
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.data.as_bytes()))
    }
}

/// Schema of [`CacheEntryEntity`].
static CACHE_ENTRY_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(CACHE_TABLE)
        .column(ColumnDef::integer("ID").read_only())
        .column(ColumnDef::text("Label").required())
        .column(ColumnDef::text("Scope").required())
        .column(ColumnDef::text("Data").required().encrypted())
        .column(ColumnDef::timestamp("Created").read_only())
        .build()
});

impl Entity for CacheEntryEntity {
    fn schema() -> &'static EntitySchema {
        &CACHE_ENTRY_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("ID", self.id)
            .with("Label", &self.label)
            .with("Scope", &self.scope)
            .with("Data", &self.data)
            .with("Created", self.created)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            id: fields.take_integer(CACHE_TABLE, "ID")?,
            label: fields.take_text(CACHE_TABLE, "Label")?,
            scope: fields.take_text(CACHE_TABLE, "Scope")?,
            data: fields.take_text(CACHE_TABLE, "Data")?,
            created: fields.take_timestamp(CACHE_TABLE, "Created")?,
        })
    }
}

/// Edge from a `(bucket, key)` pair to the cache entry derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDependencyEntity {
    /// Bucket the entry depends on.
    pub bucket: String,
    /// Key the entry depends on.
    pub key: String,
    /// Label of the owning entry.
    pub label: String,
    /// Scope of the owning entry.
    pub scope: String,
    /// Identifier of the owning entry.
    pub cache_id: i64,
    /// Storage-assigned creation time.
    pub created: Option<OffsetDateTime>,
}

/// Schema of [`CacheDependencyEntity`].
static CACHE_DEPENDENCY_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(CACHE_DEPS_TABLE)
        .column(ColumnDef::text("Bucket").required())
        .column(ColumnDef::text("Key").required())
        .column(ColumnDef::text("Label").required())
        .column(ColumnDef::text("Scope").required())
        .column(ColumnDef::integer("CacheID").required())
        .column(ColumnDef::timestamp("Created").read_only())
        .build()
});

impl Entity for CacheDependencyEntity {
    fn schema() -> &'static EntitySchema {
        &CACHE_DEPENDENCY_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("Bucket", &self.bucket)
            .with("Key", &self.key)
            .with("Label", &self.label)
            .with("Scope", &self.scope)
            .with("CacheID", self.cache_id)
            .with("Created", self.created)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            bucket: fields.take_text(CACHE_DEPS_TABLE, "Bucket")?,
            key: fields.take_text(CACHE_DEPS_TABLE, "Key")?,
            label: fields.take_text(CACHE_DEPS_TABLE, "Label")?,
            scope: fields.take_text(CACHE_DEPS_TABLE, "Scope")?,
            cache_id: fields.take_integer(CACHE_DEPS_TABLE, "CacheID")?,
            created: fields.take_timestamp(CACHE_DEPS_TABLE, "Created")?,
        })
    }
}

// ============================================================================
// SECTION: Store Schema
// ============================================================================

/// Tables and indexes of the configuration store.
pub const STORE_SCHEMA: StoreSchema = StoreSchema {
    version: 1,
    ddl: "CREATE TABLE config_keys (
            key TEXT NOT NULL,
            version INTEGER NOT NULL,
            data_type TEXT NOT NULL,
            encrypted INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            username TEXT NOT NULL,
            validator TEXT,
            trigger TEXT,
            PRIMARY KEY (key, version)
        );
        CREATE TABLE config_values (
            key TEXT NOT NULL,
            key_version INTEGER NOT NULL,
            version INTEGER NOT NULL,
            bucket TEXT NOT NULL,
            value TEXT NOT NULL,
            data_type TEXT NOT NULL,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            username TEXT NOT NULL,
            PRIMARY KEY (key, bucket, version)
        );
        CREATE INDEX idx_config_values_bucket ON config_values (bucket, key);
        CREATE TABLE config_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            scope TEXT NOT NULL,
            data TEXT NOT NULL,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE UNIQUE INDEX idx_config_cache_label_scope ON config_cache (label, scope);
        CREATE TABLE config_cachedeps (
            bucket TEXT NOT NULL,
            key TEXT NOT NULL,
            label TEXT NOT NULL,
            scope TEXT NOT NULL,
            cache_id INTEGER NOT NULL,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (cache_id, bucket, key)
        );
        CREATE INDEX idx_config_cachedeps_bucket_key ON config_cachedeps (bucket, key);",
};

// ============================================================================
// SECTION: Tests
// ============================================================================
