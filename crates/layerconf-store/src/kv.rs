// crates/layerconf-store/src/kv.rs
// ============================================================================
// Module: Key/Value Repository
// Description: Append-only versioned keys and per-bucket values.
// Purpose: Enforce key definitions on every value write.
// Dependencies: layerconf-db, crate::model, crate::cache
// ============================================================================

//! ## Overview
//! Keys and values are never updated in place. A write whose content equals
//! the latest version returns that version unchanged; any other write adds a
//! row whose version the database assigns inside the inserting statement.
//!
//! Creating a value runs in one immediate transaction: resolve the key
//! version, enforce its data type, decode and validate the payload, skip
//! duplicates, insert, then invalidate every cache entry depending on the
//! value's `(bucket, key)`. Deletes invalidate dependent cache entries before
//! removing rows. Every public operation has an `_in` variant that composes
//! into a caller's session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use layerconf_db::Database;
use layerconf_db::Delete;
use layerconf_db::EventLevel;
use layerconf_db::Insert;
use layerconf_db::Order;
use layerconf_db::Select;
use layerconf_db::Session;
use layerconf_db::StoreEvent;
use layerconf_db::SubQuery;

use crate::cache::CacheRepository;
use crate::cache::CacheSelector;
use crate::cache::Invalidation;
use crate::error::StoreError;
use crate::error::found;
use crate::model::BucketEntity;
use crate::model::BucketNameEntity;
use crate::model::KEYS_TABLE;
use crate::model::KeyEntity;
use crate::model::VALUES_TABLE;
use crate::model::ValueEntity;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rows removed by one delete operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deletion {
    /// Deleted key versions.
    pub keys: usize,
    /// Deleted value versions.
    pub values: usize,
    /// Cache rows invalidated beforehand.
    pub cache: Invalidation,
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Versioned key/value store.
#[derive(Debug, Clone)]
pub struct KeyValueRepository {
    /// Shared database handle.
    db: Arc<Database>,
    /// Cache repository invalidated by value writes.
    cache: CacheRepository,
}

impl KeyValueRepository {
    /// Creates a repository over the shared database handle.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        let cache = CacheRepository::new(Arc::clone(&db));
        Self {
            db,
            cache,
        }
    }

    /// Returns the database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    /// Stores a key version unless it equals the latest one.
    ///
    /// # Errors
    ///
    /// Returns an incomplete-entity [`StoreError`] when a required field is
    /// empty, or any storage error.
    pub fn create_key(&self, key: &KeyEntity) -> Result<KeyEntity, StoreError> {
        self.db.transaction_result("create_key", |session| self.create_key_in(session, key))
    }

    /// Same as [`KeyValueRepository::create_key`] within an open transaction.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::create_key`].
    pub fn create_key_in(
        &self,
        session: &Session<'_>,
        key: &KeyEntity,
    ) -> Result<KeyEntity, StoreError> {
        if let Some(latest) = found(self.latest_key_in(session, &key.key))?
            && latest.same_content(key)
        {
            record_dedup(
                session,
                KEYS_TABLE,
                format!("key={} version={}", latest.key, latest.version),
            );
            return Ok(latest);
        }
        Ok(Insert::new(key).execute(session)?)
    }

    /// Returns the latest version of a key.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when the key does not exist.
    pub fn latest_key(&self, name: &str) -> Result<KeyEntity, StoreError> {
        self.db.read(|session| self.latest_key_in(session, name))
    }

    /// Same as [`KeyValueRepository::latest_key`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::latest_key`].
    pub fn latest_key_in(
        &self,
        session: &Session<'_>,
        name: &str,
    ) -> Result<KeyEntity, StoreError> {
        Ok(Select::<KeyEntity>::new()
            .where_eq("Key", name)
            .order_by("Version", Order::Desc)
            .limit(1)
            .get_one(session)?)
    }

    /// Returns one version of a key.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when the version does not exist.
    pub fn key_at(&self, name: &str, version: i64) -> Result<KeyEntity, StoreError> {
        self.db.read(|session| self.key_at_in(session, name, version))
    }

    /// Same as [`KeyValueRepository::key_at`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::key_at`].
    pub fn key_at_in(
        &self,
        session: &Session<'_>,
        name: &str,
        version: i64,
    ) -> Result<KeyEntity, StoreError> {
        Ok(Select::<KeyEntity>::new()
            .where_eq("Key", name)
            .where_eq("Version", version)
            .get_one(session)?)
    }

    /// Returns every version of a key, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage failures.
    pub fn key_history(&self, name: &str) -> Result<Vec<KeyEntity>, StoreError> {
        self.db.read(|session| {
            Ok(Select::<KeyEntity>::new()
                .where_eq("Key", name)
                .order_by("Version", Order::Asc)
                .get_many(session)?)
        })
    }

    /// Returns the latest version of every key, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage failures.
    pub fn keys(&self) -> Result<Vec<KeyEntity>, StoreError> {
        self.db.read(|session| self.keys_in(session))
    }

    /// Same as [`KeyValueRepository::keys`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::keys`].
    pub fn keys_in(&self, session: &Session<'_>) -> Result<Vec<KeyEntity>, StoreError> {
        Ok(Select::<KeyEntity>::new()
            .where_in(&["Key", "Version"], SubQuery::latest::<KeyEntity>("Version", &["Key"]))
            .order_by("Key", Order::Asc)
            .get_many(session)?)
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    /// Validates and stores a value version unless it equals the latest one,
    /// then invalidates cache entries depending on its `(bucket, key)`.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when the key version does not
    /// exist, [`StoreError::InvalidDataType`] when the value declares another
    /// data type, [`StoreError::Parse`] or [`StoreError::Rule`] when the
    /// payload or validator cannot be evaluated, [`StoreError::Validation`]
    /// when the validator rejects the payload, or any storage error. Nothing
    /// is written on error.
    pub fn create_value(&self, value: &ValueEntity) -> Result<ValueEntity, StoreError> {
        self.db.transaction_result("create_value", |session| self.create_value_in(session, value))
    }

    /// Same as [`KeyValueRepository::create_value`] within an open
    /// transaction.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::create_value`].
    pub fn create_value_in(
        &self,
        session: &Session<'_>,
        value: &ValueEntity,
    ) -> Result<ValueEntity, StoreError> {
        let key = self.key_at_in(session, &value.key, value.key_version)?;
        let mut candidate = value.clone();
        match candidate.data_type {
            Some(declared) if declared != key.data_type => {
                return Err(StoreError::InvalidDataType {
                    key: key.key,
                    invalid_data_type: declared,
                    expected: key.data_type,
                });
            }
            _ => candidate.data_type = Some(key.data_type),
        }
        key.validate(&candidate.value)?;
        if let Some(latest) =
            found(self.latest_value_in(session, &candidate.bucket, &candidate.key))?
            && latest.same_content(&candidate)
        {
            record_dedup(
                session,
                VALUES_TABLE,
                format!("bucket={} key={} version={}", latest.bucket, latest.key, latest.version),
            );
            return Ok(latest);
        }
        let stored = Insert::new(&candidate).execute(session)?;
        self.cache.invalidate_in(
            session,
            &CacheSelector::new().bucket(&stored.bucket).key(&stored.key),
        )?;
        Ok(stored)
    }

    /// Returns the latest value of a key within a bucket.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when no value exists.
    pub fn latest_value(&self, bucket: &str, key: &str) -> Result<ValueEntity, StoreError> {
        self.db.read(|session| self.latest_value_in(session, bucket, key))
    }

    /// Same as [`KeyValueRepository::latest_value`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::latest_value`].
    pub fn latest_value_in(
        &self,
        session: &Session<'_>,
        bucket: &str,
        key: &str,
    ) -> Result<ValueEntity, StoreError> {
        Ok(Select::<ValueEntity>::new()
            .where_eq("Bucket", bucket)
            .where_eq("Key", key)
            .order_by("Version", Order::Desc)
            .limit(1)
            .get_one(session)?)
    }

    /// Returns one version of a key's value within a bucket.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when the version does not exist.
    pub fn value_at(
        &self,
        bucket: &str,
        key: &str,
        version: i64,
    ) -> Result<ValueEntity, StoreError> {
        self.db.read(|session| {
            Ok(Select::<ValueEntity>::new()
                .where_eq("Bucket", bucket)
                .where_eq("Key", key)
                .where_eq("Version", version)
                .get_one(session)?)
        })
    }

    /// Returns every version of a key's value within a bucket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn value_history(&self, bucket: &str, key: &str) -> Result<Vec<ValueEntity>, StoreError> {
        self.db.read(|session| {
            Ok(Select::<ValueEntity>::new()
                .where_eq("Bucket", bucket)
                .where_eq("Key", key)
                .order_by("Version", Order::Asc)
                .get_many(session)?)
        })
    }

    /// Returns the latest value of every key within a bucket, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn values_by_bucket(&self, bucket: &str) -> Result<Vec<ValueEntity>, StoreError> {
        self.db.read(|session| self.values_by_bucket_in(session, bucket))
    }

    /// Same as [`KeyValueRepository::values_by_bucket`] within an open
    /// session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::values_by_bucket`].
    pub fn values_by_bucket_in(
        &self,
        session: &Session<'_>,
        bucket: &str,
    ) -> Result<Vec<ValueEntity>, StoreError> {
        let latest = SubQuery::latest::<ValueEntity>("Version", &["Key", "Bucket"])
            .where_eq("Bucket", bucket);
        Ok(Select::<ValueEntity>::new()
            .where_eq("Bucket", bucket)
            .where_in(&["Key", "Bucket", "Version"], latest)
            .order_by("Key", Order::Asc)
            .get_many(session)?)
    }

    /// Returns the latest value per bucket for a key version, ordered by
    /// bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn values_by_key(&self, key: &KeyEntity) -> Result<Vec<ValueEntity>, StoreError> {
        self.db.read(|session| self.values_by_key_in(session, key))
    }

    /// Same as [`KeyValueRepository::values_by_key`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueRepository::values_by_key`].
    pub fn values_by_key_in(
        &self,
        session: &Session<'_>,
        key: &KeyEntity,
    ) -> Result<Vec<ValueEntity>, StoreError> {
        let latest = SubQuery::latest::<ValueEntity>("Version", &["Key", "Bucket"])
            .where_eq("Key", &key.key)
            .where_eq("KeyVersion", key.version);
        Ok(Select::<ValueEntity>::new()
            .where_eq("Key", &key.key)
            .where_eq("KeyVersion", key.version)
            .where_in(&["Key", "Bucket", "Version"], latest)
            .order_by("Bucket", Order::Asc)
            .get_many(session)?)
    }

    // ------------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------------

    /// Returns the earliest value row of every bucket, ordered by name.
    ///
    /// Rows sharing a creation time resolve by version, then key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage failures.
    pub fn buckets(&self) -> Result<Vec<BucketEntity>, StoreError> {
        self.db.read(|session| {
            let names = Select::<BucketNameEntity>::new()
                .distinct()
                .order_by("Bucket", Order::Asc)
                .get_many(session)?;
            let mut buckets = Vec::with_capacity(names.len());
            for name in names {
                buckets.push(
                    Select::<BucketEntity>::new()
                        .where_eq("Bucket", name.bucket)
                        .order_by("Created", Order::Asc)
                        .order_by("Version", Order::Asc)
                        .order_by("Key", Order::Asc)
                        .limit(1)
                        .get_one(session)?,
                );
            }
            Ok(buckets)
        })
    }

    // ------------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------------

    /// Deletes every version of a key and all of its values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails; nothing is deleted in that
    /// case.
    pub fn delete_key(&self, name: &str) -> Result<Deletion, StoreError> {
        self.db.transaction_result("delete_key", |session| {
            let cache = self.cache.invalidate_in(session, &CacheSelector::new().key(name))?;
            let values = Delete::<ValueEntity>::new().where_eq("Key", name).execute(session)?;
            let keys = Delete::<KeyEntity>::new().where_eq("Key", name).execute(session)?;
            let deletion = Deletion {
                keys,
                values,
                cache,
            };
            record_deletion(session, KEYS_TABLE, format!("key={name}"), deletion);
            Ok(deletion)
        })
    }

    /// Deletes every value stored in a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails; nothing is deleted in that
    /// case.
    pub fn delete_bucket(&self, bucket: &str) -> Result<Deletion, StoreError> {
        self.db.transaction_result("delete_bucket", |session| {
            let cache = self.cache.invalidate_in(session, &CacheSelector::new().bucket(bucket))?;
            let values =
                Delete::<ValueEntity>::new().where_eq("Bucket", bucket).execute(session)?;
            let deletion = Deletion {
                keys: 0,
                values,
                cache,
            };
            record_deletion(session, VALUES_TABLE, format!("bucket={bucket}"), deletion);
            Ok(deletion)
        })
    }

    /// Deletes every version of a key's value within a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails; nothing is deleted in that
    /// case.
    pub fn delete_value(&self, key: &str, bucket: &str) -> Result<Deletion, StoreError> {
        self.db.transaction_result("delete_value", |session| {
            let cache = self
                .cache
                .invalidate_in(session, &CacheSelector::new().bucket(bucket).key(key))?;
            let values = Delete::<ValueEntity>::new()
                .where_eq("Key", key)
                .where_eq("Bucket", bucket)
                .execute(session)?;
            let deletion = Deletion {
                keys: 0,
                values,
                cache,
            };
            record_deletion(
                session,
                VALUES_TABLE,
                format!("bucket={bucket} key={key}"),
                deletion,
            );
            Ok(deletion)
        })
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Records a write that matched the latest version.
fn record_dedup(session: &Session<'_>, table: &str, detail: String) {
    session.record(StoreEvent::new("dedup_noop", EventLevel::Info).table(table).message(detail));
}

/// Records the outcome of a delete operation.
fn record_deletion(session: &Session<'_>, table: &str, scope: String, deletion: Deletion) {
    session.record(
        StoreEvent::new("rows_deleted", EventLevel::Info)
            .table(table)
            .message(format!("{scope}: {} cache entries invalidated", deletion.cache.entries))
            .count(deletion.keys + deletion.values),
    );
}
