// crates/layerconf-store/src/cache.rs
// ============================================================================
// Module: Cache Repository
// Description: Cache entries with dependency tracking and invalidation.
// Purpose: Keep computed artifacts consistent with the values they used.
// Dependencies: layerconf-db, crate::model
// ============================================================================

//! ## Overview
//! A cache entry lives under a unique `(label, scope)` pair. Adding an entry
//! whose payload checksum matches the live one is a no-op; a differing
//! payload supersedes the live entry. Each entry records the `(bucket, key)`
//! pairs it was computed from, so value writes and deletes can invalidate
//! exactly the entries that depended on them.
//!
//! Invalidation runs as two set-based deletes in one transaction. A selector
//! naming a bucket or key removes the entries owning matching dependency
//! rows, then every dependency row of those owners, both through a
//! sub-query on the dependency table. Any other selector matches entries on
//! label, scope and id directly; dependency rows carry their owner's label,
//! scope and id, so the same filter removes them. No statement binds one
//! parameter per entry, so invalidation scales with the table rather than
//! with the bind limit. An empty selector invalidates everything and is
//! reported as a warning event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
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

use crate::error::StoreError;
use crate::error::found;
use crate::model::CACHE_TABLE;
use crate::model::CacheDependencyEntity;
use crate::model::CacheEntryEntity;
use crate::model::ValueEntity;

// ============================================================================
// SECTION: Selectors
// ============================================================================

/// `(bucket, key)` pair a cache entry was computed from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyKey {
    /// Bucket name.
    pub bucket: String,
    /// Key name.
    pub key: String,
}

impl DependencyKey {
    /// Creates a dependency on `key` within `bucket`.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl From<&ValueEntity> for DependencyKey {
    fn from(value: &ValueEntity) -> Self {
        Self::new(&value.bucket, &value.key)
    }
}

/// Combination of filters selecting cache entries to invalidate.
///
/// Every set component must match; an empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSelector {
    /// Dependency bucket.
    bucket: Option<String>,
    /// Dependency key.
    key: Option<String>,
    /// Entry label.
    label: Option<String>,
    /// Entry scope.
    scope: Option<String>,
    /// Entry identifier.
    cache_id: Option<i64>,
}

impl CacheSelector {
    /// Creates an empty selector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches entries depending on `bucket`.
    #[must_use]
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Matches entries depending on `key`.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Matches entries with `label`.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Matches entries with `scope`.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Matches the entry with identifier `cache_id`.
    #[must_use]
    pub const fn cache_id(mut self, cache_id: i64) -> Self {
        self.cache_id = Some(cache_id);
        self
    }

    /// Returns true when no component is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bucket.is_none()
            && self.key.is_none()
            && self.label.is_none()
            && self.scope.is_none()
            && self.cache_id.is_none()
    }

    /// Returns true when the selector names a bucket or key.
    const fn targets_dependencies(&self) -> bool {
        self.bucket.is_some() || self.key.is_some()
    }

    /// Builds the dependency row query for this selector.
    fn dependency_query(&self) -> Select<CacheDependencyEntity> {
        let mut query = Select::new();
        if let Some(bucket) = &self.bucket {
            query = query.where_eq("Bucket", bucket);
        }
        if let Some(key) = &self.key {
            query = query.where_eq("Key", key);
        }
        if let Some(label) = &self.label {
            query = query.where_eq("Label", label);
        }
        if let Some(scope) = &self.scope {
            query = query.where_eq("Scope", scope);
        }
        if let Some(cache_id) = self.cache_id {
            query = query.where_eq("CacheID", cache_id);
        }
        query
    }

    /// Builds the sub-query yielding the owners of matching dependency rows.
    fn owner_query(&self) -> SubQuery {
        let mut query = SubQuery::columns::<CacheDependencyEntity>(&["CacheID"]);
        if let Some(bucket) = &self.bucket {
            query = query.where_eq("Bucket", bucket);
        }
        if let Some(key) = &self.key {
            query = query.where_eq("Key", key);
        }
        if let Some(label) = &self.label {
            query = query.where_eq("Label", label);
        }
        if let Some(scope) = &self.scope {
            query = query.where_eq("Scope", scope);
        }
        if let Some(cache_id) = self.cache_id {
            query = query.where_eq("CacheID", cache_id);
        }
        query
    }

    /// Builds the delete removing matched entries.
    fn entry_delete(&self) -> Delete<CacheEntryEntity> {
        if self.targets_dependencies() {
            return Delete::new().where_in(&["ID"], self.owner_query());
        }
        let mut delete = Delete::new();
        if let Some(label) = &self.label {
            delete = delete.where_eq("Label", label);
        }
        if let Some(scope) = &self.scope {
            delete = delete.where_eq("Scope", scope);
        }
        if let Some(cache_id) = self.cache_id {
            delete = delete.where_eq("ID", cache_id);
        }
        delete
    }

    /// Builds the delete removing every dependency row of matched entries.
    ///
    /// Must run after [`CacheSelector::entry_delete`]: the owner sub-query
    /// reads the rows this statement removes.
    fn dependency_delete(&self) -> Delete<CacheDependencyEntity> {
        if self.targets_dependencies() {
            return Delete::new().where_in(&["CacheID"], self.owner_query());
        }
        let mut delete = Delete::new();
        if let Some(label) = &self.label {
            delete = delete.where_eq("Label", label);
        }
        if let Some(scope) = &self.scope {
            delete = delete.where_eq("Scope", scope);
        }
        if let Some(cache_id) = self.cache_id {
            delete = delete.where_eq("CacheID", cache_id);
        }
        delete
    }
}

impl fmt::Display for CacheSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("all entries");
        }
        let mut parts = Vec::new();
        if let Some(bucket) = &self.bucket {
            parts.push(format!("bucket={bucket}"));
        }
        if let Some(key) = &self.key {
            parts.push(format!("key={key}"));
        }
        if let Some(label) = &self.label {
            parts.push(format!("label={label}"));
        }
        if let Some(scope) = &self.scope {
            parts.push(format!("scope={scope}"));
        }
        if let Some(cache_id) = self.cache_id {
            parts.push(format!("id={cache_id}"));
        }
        f.write_str(&parts.join(" "))
    }
}

/// Rows removed by one invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Deleted cache entries.
    pub entries: usize,
    /// Deleted dependency rows.
    pub dependencies: usize,
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Cache entry store and dependency manager.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    /// Shared database handle.
    db: Arc<Database>,
}

impl CacheRepository {
    /// Creates a repository over the shared database handle.
    #[must_use]
    pub const fn new(db: Arc<Database>) -> Self {
        Self {
            db,
        }
    }

    /// Returns the live entry for `(label, scope)`.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when no entry is live, or any
    /// storage error.
    pub fn get(&self, label: &str, scope: &str) -> Result<CacheEntryEntity, StoreError> {
        self.db.read(|session| self.get_in(session, label, scope))
    }

    /// Same as [`CacheRepository::get`] within an open session.
    ///
    /// # Errors
    ///
    /// Same as [`CacheRepository::get`].
    pub fn get_in(
        &self,
        session: &Session<'_>,
        label: &str,
        scope: &str,
    ) -> Result<CacheEntryEntity, StoreError> {
        Ok(Select::<CacheEntryEntity>::new()
            .where_eq("Label", label)
            .where_eq("Scope", scope)
            .get_one(session)?)
    }

    /// Returns the entry with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`StoreError`] when no entry has the id.
    pub fn get_by_id(&self, id: i64) -> Result<CacheEntryEntity, StoreError> {
        self.db.read(|session| {
            Ok(Select::<CacheEntryEntity>::new().where_eq("ID", id).get_one(session)?)
        })
    }

    /// Returns every live entry ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn all(&self) -> Result<Vec<CacheEntryEntity>, StoreError> {
        self.db.read(|session| {
            Ok(Select::<CacheEntryEntity>::new().order_by("ID", Order::Asc).get_many(session)?)
        })
    }

    /// Stores `entry` with its dependencies, superseding a live entry with a
    /// different payload.
    ///
    /// Returns the live entry unchanged when its checksum matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the entry is incomplete or storage fails;
    /// nothing is written in that case.
    pub fn add(
        &self,
        entry: &CacheEntryEntity,
        dependencies: &[DependencyKey],
    ) -> Result<CacheEntryEntity, StoreError> {
        self.db.transaction_result("cache_add", |session| self.add_in(session, entry, dependencies))
    }

    /// Same as [`CacheRepository::add`] within an open transaction.
    ///
    /// # Errors
    ///
    /// Same as [`CacheRepository::add`].
    pub fn add_in(
        &self,
        session: &Session<'_>,
        entry: &CacheEntryEntity,
        dependencies: &[DependencyKey],
    ) -> Result<CacheEntryEntity, StoreError> {
        if let Some(live) = found(self.get_in(session, &entry.label, &entry.scope))? {
            if live.checksum() == entry.checksum() {
                session.record(
                    StoreEvent::new("dedup_noop", EventLevel::Info)
                        .table(CACHE_TABLE)
                        .message(format!(
                            "label={} scope={} id={}",
                            live.label, live.scope, live.id
                        )),
                );
                return Ok(live);
            }
            self.invalidate_by_id_in(session, live.id)?;
        }
        let stored = Insert::new(entry).execute(session)?;
        let pairs: BTreeSet<&DependencyKey> = dependencies.iter().collect();
        for pair in pairs {
            let dependency = CacheDependencyEntity {
                bucket: pair.bucket.clone(),
                key: pair.key.clone(),
                label: stored.label.clone(),
                scope: stored.scope.clone(),
                cache_id: stored.id,
                created: None,
            };
            Insert::new(&dependency).execute(session)?;
        }
        Ok(stored)
    }

    /// Invalidates every entry matched by `selector` in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails; nothing is deleted in that
    /// case.
    pub fn invalidate(&self, selector: &CacheSelector) -> Result<Invalidation, StoreError> {
        self.db.transaction_result("cache_invalidate", |session| {
            self.invalidate_in(session, selector)
        })
    }

    /// Invalidates every entry matched by `selector` within an open
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails.
    pub fn invalidate_in(
        &self,
        session: &Session<'_>,
        selector: &CacheSelector,
    ) -> Result<Invalidation, StoreError> {
        if selector.is_empty() {
            session.record(
                StoreEvent::new("cache_invalidate_all", EventLevel::Warn)
                    .table(CACHE_TABLE)
                    .message("empty selector invalidates every cache entry"),
            );
        }
        let entries = selector.entry_delete().execute(session)?;
        let dependencies = selector.dependency_delete().execute(session)?;
        if entries > 0 || dependencies > 0 {
            session.record(
                StoreEvent::new("cache_invalidated", EventLevel::Info)
                    .table(CACHE_TABLE)
                    .message(format!("{selector}: {dependencies} dependency rows removed"))
                    .count(entries),
            );
        }
        Ok(Invalidation {
            entries,
            dependencies,
        })
    }

    /// Invalidates the entry with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails.
    pub fn invalidate_by_id(&self, id: i64) -> Result<Invalidation, StoreError> {
        self.db.transaction_result("cache_invalidate", |session| {
            self.invalidate_by_id_in(session, id)
        })
    }

    /// Same as [`CacheRepository::invalidate_by_id`] within an open
    /// transaction. Records a warning when anything other than exactly one
    /// entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when storage fails.
    pub fn invalidate_by_id_in(
        &self,
        session: &Session<'_>,
        id: i64,
    ) -> Result<Invalidation, StoreError> {
        let removed = self.invalidate_in(session, &CacheSelector::new().cache_id(id))?;
        if removed.entries != 1 {
            session.record(
                StoreEvent::new("unexpected_delete_count", EventLevel::Warn)
                    .table(CACHE_TABLE)
                    .message(format!("invalidating cache entry {id}"))
                    .count(removed.entries),
            );
        }
        Ok(removed)
    }

    /// Lists dependency rows matched by `selector`, ordered by owning id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage failures.
    pub fn dependencies(
        &self,
        selector: &CacheSelector,
    ) -> Result<Vec<CacheDependencyEntity>, StoreError> {
        self.db.read(|session| {
            Ok(selector
                .dependency_query()
                .order_by("CacheID", Order::Asc)
                .order_by("Bucket", Order::Asc)
                .order_by("Key", Order::Asc)
                .get_many(session)?)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::CacheSelector;

    #[test]
    fn selector_query_only_names_set_components() {
        let selector = CacheSelector::new().bucket("team-a").key("color");
        let statement = selector.dependency_query().render().unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"bucket\", \"key\", \"label\", \"scope\", \"cache_id\", \"created\" FROM \
             \"config_cachedeps\" WHERE \"bucket\" = ?1 AND \"key\" = ?2"
        );
        assert!(selector.targets_dependencies());
    }

    #[test]
    fn dependency_selectors_delete_through_the_owner_sub_query() {
        let selector = CacheSelector::new().bucket("team-a").key("color");
        let entries = selector.entry_delete().render().unwrap();
        assert_eq!(
            entries.sql,
            "DELETE FROM \"config_cache\" WHERE (\"id\") IN (SELECT DISTINCT \"cache_id\" FROM \
             \"config_cachedeps\" WHERE \"bucket\" = ?1 AND \"key\" = ?2)"
        );
        assert_eq!(entries.args.len(), 2);
        let dependencies = selector.dependency_delete().render().unwrap();
        assert_eq!(
            dependencies.sql,
            "DELETE FROM \"config_cachedeps\" WHERE (\"cache_id\") IN (SELECT DISTINCT \
             \"cache_id\" FROM \"config_cachedeps\" WHERE \"bucket\" = ?1 AND \"key\" = ?2)"
        );
    }

    #[test]
    fn entry_selectors_delete_by_label_scope_and_id() {
        let selector = CacheSelector::new().label("render").cache_id(7);
        assert_eq!(
            selector.entry_delete().render().unwrap().sql,
            "DELETE FROM \"config_cache\" WHERE \"id\" = ?1 AND \"label\" = ?2"
        );
        assert_eq!(
            selector.dependency_delete().render().unwrap().sql,
            "DELETE FROM \"config_cachedeps\" WHERE \"cache_id\" = ?1 AND \"label\" = ?2"
        );
        let everything = CacheSelector::new().entry_delete().render().unwrap();
        assert_eq!(everything.sql, "DELETE FROM \"config_cache\"");
    }

    #[test]
    fn empty_selector_describes_everything() {
        assert!(CacheSelector::new().is_empty());
        assert_eq!(CacheSelector::new().to_string(), "all entries");
        assert_eq!(
            CacheSelector::new().scope("eu").cache_id(7).to_string(),
            "scope=eu id=7"
        );
    }
}
