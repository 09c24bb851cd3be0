// crates/layerconf-db/tests/common/mod.rs
// ============================================================================
// Module: DB Test Fixtures
// Description: Shared entity, schema and store helpers for DB tests.
// Purpose: Exercise the entity layer through a small versioned record.
// ============================================================================

//! ## Overview
//! `Note` is a versioned record partitioned by topic with one required and
//! one optional encrypted field. Helpers open a store in a temp directory.

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;

use layerconf_db::ColumnDef;
use layerconf_db::Database;
use layerconf_db::DatabaseConfig;
use layerconf_db::DbError;
use layerconf_db::Encryptor;
use layerconf_db::Entity;
use layerconf_db::EntitySchema;
use layerconf_db::FieldMap;
use layerconf_db::NoopEventSink;
use layerconf_db::StoreEvent;
use layerconf_db::StoreEventSink;
use layerconf_db::StoreSchema;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Entity
// ============================================================================

/// Table name of the test entity.
pub const NOTES: &str = "notes";

/// Versioned note partitioned by topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Note {
    pub topic: String,
    pub version: i64,
    pub body: String,
    pub memo: Option<String>,
    pub pinned: bool,
    pub created: Option<OffsetDateTime>,
}

impl Note {
    pub fn new(topic: &str, body: &str) -> Self {
        Self {
            topic: topic.to_string(),
            body: body.to_string(),
            ..Self::default()
        }
    }
}

static NOTE_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::builder(NOTES)
        .column(ColumnDef::text("Topic").required())
        .column(ColumnDef::integer("Version").read_only())
        .column(ColumnDef::text("Body").required().encrypted())
        .column(ColumnDef::text("Memo").encrypted())
        .column(ColumnDef::boolean("Pinned"))
        .column(ColumnDef::timestamp("Created").read_only())
        .sequence("Version", &["Topic"])
        .build()
});

impl Entity for Note {
    fn schema() -> &'static EntitySchema {
        &NOTE_SCHEMA
    }

    fn to_fields(&self) -> FieldMap {
        FieldMap::new()
            .with("Topic", &self.topic)
            .with("Version", self.version)
            .with("Body", &self.body)
            .with("Memo", self.memo.clone())
            .with("Pinned", self.pinned)
            .with("Created", self.created)
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, DbError> {
        Ok(Self {
            topic: fields.take_text(NOTES, "Topic")?,
            version: fields.take_integer(NOTES, "Version")?,
            body: fields.take_text(NOTES, "Body")?,
            memo: fields.take_optional_text(NOTES, "Memo")?,
            pinned: fields.take_bool(NOTES, "Pinned")?,
            created: fields.take_timestamp(NOTES, "Created")?,
        })
    }
}

/// DDL for the notes store.
pub const NOTE_STORE: StoreSchema = StoreSchema {
    version: 1,
    ddl: "CREATE TABLE notes (
            topic TEXT NOT NULL,
            version INTEGER NOT NULL,
            body TEXT NOT NULL,
            memo TEXT,
            pinned INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (topic, version)
        );",
};

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
}

impl StoreEventSink for CapturingSink {
    fn record(&self, event: &StoreEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

pub fn open_with(path: &Path, key: &str, events: Arc<dyn StoreEventSink>) -> Database {
    let encryptor = Encryptor::new(key).unwrap();
    Database::open(&DatabaseConfig::new(path), encryptor, events, &NOTE_STORE).unwrap()
}

pub fn open(path: &Path) -> Database {
    open_with(path, &Encryptor::generate_key(), Arc::new(NoopEventSink))
}
