// crates/layerconf-store/src/service.rs
// ============================================================================
// Module: Config Service
// Description: Assembly of the store around one shared database handle.
// Purpose: Own the database lifecycle and hand out wired repositories.
// Dependencies: layerconf-config, layerconf-db, crate::kv, crate::cache
// ============================================================================

//! ## Overview
//! [`ConfigService::open`] turns a validated [`LayerconfConfig`] into a
//! running store: it loads the encryption key, builds the event sink, opens
//! the database and wires every repository around the same
//! `Arc<Database>`. Key material problems surface here, before any request
//! is served.

use std::sync::Arc;

use layerconf_config::LayerconfConfig;
use layerconf_db::Database;
use layerconf_db::EventLevel;
use layerconf_db::StoreEvent;

use crate::cache::CacheRepository;
use crate::error::StoreError;
use crate::kv::KeyValueRepository;
use crate::listing::KeyListing;
use crate::merge::BucketMerger;
use crate::model::STORE_SCHEMA;

/// Configuration store with its repositories.
#[derive(Debug, Clone)]
pub struct ConfigService {
    /// Shared database handle.
    db: Arc<Database>,
    /// Key/value repository.
    kv: KeyValueRepository,
    /// Cache repository.
    cache: CacheRepository,
    /// Bucket merger.
    merger: BucketMerger,
}

impl ConfigService {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the configuration or key file is
    /// unusable, or a storage error when the database cannot be opened.
    pub fn open(config: &LayerconfConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let encryptor = config.encryption.load_key()?;
        let events = config.logging.build_sink()?;
        let db = Database::open(&config.database, encryptor, events, &STORE_SCHEMA)?;
        db.events().record(
            &StoreEvent::new("service_ready", EventLevel::Info)
                .message(db.path().display().to_string()),
        );
        Ok(Self::with_database(Arc::new(db)))
    }

    /// Wires the repositories around an existing database handle.
    #[must_use]
    pub fn with_database(db: Arc<Database>) -> Self {
        let kv = KeyValueRepository::new(Arc::clone(&db));
        let cache = CacheRepository::new(Arc::clone(&db));
        let merger = BucketMerger::new(kv.clone());
        Self {
            db,
            kv,
            cache,
            merger,
        }
    }

    /// Returns the shared database handle.
    #[must_use]
    pub const fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Returns the key/value repository.
    #[must_use]
    pub const fn kv(&self) -> &KeyValueRepository {
        &self.kv
    }

    /// Returns the cache repository.
    #[must_use]
    pub const fn cache(&self) -> &CacheRepository {
        &self.cache
    }

    /// Returns the bucket merger.
    #[must_use]
    pub const fn merger(&self) -> &BucketMerger {
        &self.merger
    }

    /// Lists keys; see [`KeyListing::build`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn listing(&self, key_filter: &[&str]) -> Result<KeyListing, StoreError> {
        KeyListing::build(&self.kv, key_filter)
    }
}
