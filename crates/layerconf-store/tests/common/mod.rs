// crates/layerconf-store/tests/common/mod.rs
// ============================================================================
// Module: Store Test Fixtures
// Description: Shared store setup and write helpers for store tests.
// Purpose: Open a fresh configuration store per test in a temp directory.
// ============================================================================

//! ## Overview
//! `Fixture` owns the temp directory, the service and a capturing event sink
//! so tests can assert on recorded events.

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use layerconf_db::Database;
use layerconf_db::DatabaseConfig;
use layerconf_db::Encryptor;
use layerconf_db::StoreEvent;
use layerconf_db::StoreEventSink;
use layerconf_store::ConfigService;
use layerconf_store::DataType;
use layerconf_store::KeyEntity;
use layerconf_store::STORE_SCHEMA;
use layerconf_store::ValueEntity;
use tempfile::TempDir;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink capturing events for assertions.
#[derive(Default)]
pub struct CapturingSink {
    pub events: Mutex<Vec<StoreEvent>>,
}

impl CapturingSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|event| *event == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl StoreEventSink for CapturingSink {
    fn record(&self, event: &StoreEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Fresh store in a temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub service: ConfigService,
    pub events: Arc<CapturingSink>,
}

/// Opens a fresh store.
pub fn fixture() -> Fixture {
    Fixture::open()
}

impl Fixture {
    fn open() -> Self {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(CapturingSink::default());
        let encryptor = Encryptor::new(&Encryptor::generate_key()).unwrap();
        let db = Database::open(
            &DatabaseConfig::new(dir.path().join("store.db")),
            encryptor,
            events.clone(),
            &STORE_SCHEMA,
        )
        .unwrap();
        Self {
            dir,
            service: ConfigService::with_database(Arc::new(db)),
            events,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("store.db")
    }

    /// Creates (or dedups) a key.
    pub fn key(&self, key: KeyEntity) -> KeyEntity {
        self.service.kv().create_key(&key).unwrap()
    }

    /// Creates a string key with an optional validator.
    pub fn string_key(&self, name: &str, validator: Option<&str>) -> KeyEntity {
        let mut key = KeyEntity::new(name, DataType::String, "alice");
        if let Some(validator) = validator {
            key = key.with_validator(validator);
        }
        self.key(key)
    }

    /// Stores a value for `key` in `bucket`.
    pub fn put(&self, bucket: &str, key: &KeyEntity, payload: &str) -> ValueEntity {
        self.service.kv().create_value(&ValueEntity::new(bucket, key, payload, "alice")).unwrap()
    }
}
