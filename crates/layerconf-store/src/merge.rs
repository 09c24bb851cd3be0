// crates/layerconf-store/src/merge.rs
// ============================================================================
// Module: Bucket Merger
// Description: Layered resolution of bucket values into one typed view.
// Purpose: Let more specific buckets override the default bucket key by key.
// Dependencies: layerconf-expr, crate::kv, crate::model
// ============================================================================

//! ## Overview
//! A merge walks the fixed layer sequence `default, landscape, customer,
//! cluster, feature`. The default bucket is always read; every other layer
//! contributes bucket `<layer>-<sub-bucket>` when the caller names it. Later
//! buckets overwrite earlier ones key by key. All buckets are read from one
//! snapshot, and every value is decoded through its data type so consumers
//! receive typed values.

use std::collections::BTreeMap;

use layerconf_expr::Value;

use crate::error::StoreError;
use crate::kv::KeyValueRepository;
use crate::model::DEFAULT_BUCKET;
use crate::model::OVERRIDE_LAYERS;
use crate::model::ValueEntity;
use crate::model::is_valid_bucket_name;

// ============================================================================
// SECTION: Merge Result
// ============================================================================

/// Value that won the merge for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Merged {
    /// Stored value row.
    entity: ValueEntity,
    /// Decoded payload.
    typed: Value,
}

/// Outcome of a bucket merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Winning values keyed by key name.
    values: BTreeMap<String, Merged>,
    /// Buckets read, in merge order.
    buckets: Vec<String>,
}

impl MergeResult {
    /// Returns the winning value rows ordered by key.
    #[must_use]
    pub fn values(&self) -> Vec<&ValueEntity> {
        self.values.values().map(|merged| &merged.entity).collect()
    }

    /// Returns the winning value row of `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&ValueEntity> {
        self.values.get(key).map(|merged| &merged.entity)
    }

    /// Returns the typed payload of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).map(|merged| &merged.typed)
    }

    /// Returns every typed payload keyed by key name.
    #[must_use]
    pub fn get_all(&self) -> BTreeMap<&str, &Value> {
        self.values.iter().map(|(key, merged)| (key.as_str(), &merged.typed)).collect()
    }

    /// Returns the buckets read, in merge order.
    #[must_use]
    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    /// Returns the number of merged keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no bucket held a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// SECTION: Merger
// ============================================================================

/// Resolves layered buckets into a single view.
#[derive(Debug, Clone)]
pub struct BucketMerger {
    /// Value source.
    kv: KeyValueRepository,
}

impl BucketMerger {
    /// Creates a merger reading through `kv`.
    #[must_use]
    pub const fn new(kv: KeyValueRepository) -> Self {
        Self {
            kv,
        }
    }

    /// Merges the default bucket with the named override layers.
    ///
    /// `layers` maps override layer names to sub-bucket names.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMergeLayer`] for unknown layer names,
    /// [`StoreError::InvalidBucket`] when a sub-bucket yields an invalid
    /// bucket name, [`StoreError::DataInconsistency`] when a stored value
    /// does not decode, or any storage error.
    pub fn merge(&self, layers: &BTreeMap<String, String>) -> Result<MergeResult, StoreError> {
        let buckets = merge_sequence(layers)?;
        self.kv.database().read(|session| {
            let mut values = BTreeMap::new();
            for bucket in &buckets {
                for entity in self.kv.values_by_bucket_in(session, bucket)? {
                    let typed = decode(&entity)?;
                    values.insert(entity.key.clone(), Merged {
                        entity,
                        typed,
                    });
                }
            }
            Ok(MergeResult {
                values,
                buckets,
            })
        })
    }
}

/// Returns the buckets a merge reads, in order.
///
/// # Errors
///
/// Returns [`StoreError::InvalidMergeLayer`] for unknown layer names and
/// [`StoreError::InvalidBucket`] when a sub-bucket yields an invalid name.
pub fn merge_sequence(layers: &BTreeMap<String, String>) -> Result<Vec<String>, StoreError> {
    if let Some(layer) = layers.keys().find(|layer| !OVERRIDE_LAYERS.contains(&layer.as_str())) {
        return Err(StoreError::InvalidMergeLayer {
            layer: layer.clone(),
        });
    }
    let mut buckets = vec![DEFAULT_BUCKET.to_string()];
    for layer in OVERRIDE_LAYERS {
        if let Some(sub_bucket) = layers.get(layer) {
            let bucket = format!("{layer}-{sub_bucket}");
            if !is_valid_bucket_name(&bucket) {
                return Err(StoreError::InvalidBucket(bucket));
            }
            buckets.push(bucket);
        }
    }
    Ok(buckets)
}

/// Decodes a stored value through its recorded data type.
fn decode(entity: &ValueEntity) -> Result<Value, StoreError> {
    let inconsistent = |message: String| StoreError::DataInconsistency {
        bucket: entity.bucket.clone(),
        key: entity.key.clone(),
        message,
    };
    let data_type =
        entity.data_type.ok_or_else(|| inconsistent("value has no data type".to_string()))?;
    data_type.decode(&entity.key, &entity.value).map_err(|err| inconsistent(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
