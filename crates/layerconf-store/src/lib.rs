// crates/layerconf-store/src/lib.rs
// ============================================================================
// Module: Layerconf Store Library
// Description: Versioned configuration store with layered buckets and caching.
// Purpose: Persist keys, values and cached artifacts for many tenants.
// Dependencies: layerconf-db, layerconf-expr, layerconf-config
// ============================================================================

//! ## Overview
//! `layerconf-store` is the persistence core of a multi-tenant configuration
//! service. Keys declare a data type and an optional validator expression;
//! values are stored per bucket and checked against their key on every
//! write. Both are append-only and versioned by the database. The
//! [`BucketMerger`] resolves the `default` bucket plus override layers into
//! one typed view, and the [`CacheRepository`] keeps computed artifacts with
//! the `(bucket, key)` pairs they depend on, invalidating them whenever those
//! values change.
//!
//! Security posture: value and cache payloads are encrypted at rest;
//! validator expressions are stored data and run in a sandboxed evaluator.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod error;
pub mod kv;
pub mod listing;
pub mod merge;
pub mod model;
pub mod service;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheRepository;
pub use cache::CacheSelector;
pub use cache::DependencyKey;
pub use cache::Invalidation;
pub use error::StoreError;
pub use kv::Deletion;
pub use kv::KeyValueRepository;
pub use listing::KeyListing;
pub use listing::KeyRow;
pub use merge::BucketMerger;
pub use merge::MergeResult;
pub use merge::merge_sequence;
pub use model::BucketEntity;
pub use model::CacheDependencyEntity;
pub use model::CacheEntryEntity;
pub use model::DEFAULT_BUCKET;
pub use model::DataType;
pub use model::KeyEntity;
pub use model::OVERRIDE_LAYERS;
pub use model::STORE_SCHEMA;
pub use model::ValueEntity;
pub use model::is_valid_bucket_name;
pub use service::ConfigService;
