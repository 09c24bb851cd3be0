// crates/layerconf-store/src/listing.rs
// ============================================================================
// Module: Key Listing
// Description: Read-only rendering of keys and their bucket values.
// Purpose: Give operators a table or JSON view of the stored configuration.
// Dependencies: serde, serde_json, time, crate::kv
// ============================================================================

//! ## Overview
//! [`KeyListing::build`] collects the latest version of every key. With a
//! name filter it keeps only the named keys (unknown names are skipped) and
//! attaches each key's current value per bucket. The listing renders as an
//! aligned text table or as pretty-printed JSON.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::error::StoreError;
use crate::kv::KeyValueRepository;
use crate::model::DataType;
use crate::model::KeyEntity;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One key in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRow {
    /// Key name.
    pub key: String,
    /// Latest version.
    pub version: i64,
    /// Declared value type.
    pub data_type: DataType,
    /// Encrypted flag.
    pub encrypted: bool,
    /// Creating user.
    pub username: String,
    /// Creation time (RFC 3339).
    pub created: Option<String>,
    /// Validation expression.
    pub validator: Option<String>,
    /// Trigger label.
    pub trigger: Option<String>,
    /// Current payload per bucket; present only for filtered listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, String>>,
}

impl KeyRow {
    /// Builds a row without values.
    fn from_key(key: &KeyEntity) -> Self {
        Self {
            key: key.key.clone(),
            version: key.version,
            data_type: key.data_type,
            encrypted: key.encrypted,
            username: key.username.clone(),
            created: key.created.and_then(|created| created.format(&Rfc3339).ok()),
            validator: key.validator.clone(),
            trigger: key.trigger.clone(),
            values: None,
        }
    }
}

/// Rendered view of the stored keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyListing {
    /// Rows ordered by key name.
    pub keys: Vec<KeyRow>,
}

impl KeyListing {
    /// Lists every key, or only the keys named in `key_filter` together with
    /// their current bucket values.
    ///
    /// Keys and values are read from one snapshot, so a concurrent write is
    /// either fully visible or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for storage or decryption failures.
    pub fn build(kv: &KeyValueRepository, key_filter: &[&str]) -> Result<Self, StoreError> {
        kv.database().read(|session| {
            let keys = kv.keys_in(session)?;
            if key_filter.is_empty() {
                return Ok(Self {
                    keys: keys.iter().map(KeyRow::from_key).collect(),
                });
            }
            let wanted: BTreeSet<&str> = key_filter.iter().copied().collect();
            let mut rows = Vec::new();
            for key in keys.iter().filter(|key| wanted.contains(key.key.as_str())) {
                let mut row = KeyRow::from_key(key);
                row.values = Some(
                    kv.values_by_key_in(session, key)?
                        .into_iter()
                        .map(|value| (value.bucket, value.value))
                        .collect(),
                );
                rows.push(row);
            }
            Ok(Self {
                keys: rows,
            })
        })
    }

    /// Renders the listing as an aligned text table.
    #[must_use]
    pub fn render_table(&self) -> String {
        let with_values = self.keys.iter().any(|row| row.values.is_some());
        let mut header = vec![
            "KEY",
            "VERSION",
            "DATA TYPE",
            "ENCRYPTED",
            "CREATED BY",
            "CREATED AT (UTC)",
            "VALIDATION",
            "TRIGGER",
        ];
        if with_values {
            header.push("VALUES");
        }
        let rows: Vec<Vec<String>> = self
            .keys
            .iter()
            .map(|row| {
                let mut cells = vec![
                    row.key.clone(),
                    row.version.to_string(),
                    row.data_type.to_string(),
                    row.encrypted.to_string(),
                    row.username.clone(),
                    row.created.clone().unwrap_or_default(),
                    row.validator.clone().unwrap_or_default(),
                    row.trigger.clone().unwrap_or_default(),
                ];
                if with_values {
                    cells.push(format_values(row.values.as_ref()));
                }
                cells
            })
            .collect();
        align(&header, &rows)
    }

    /// Renders the listing as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Render`] when serialization fails.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|err| StoreError::Render(err.to_string()))
    }
}

// ============================================================================
// SECTION: Table Layout
// ============================================================================

/// Formats bucket values as `bucket=value` pairs.
fn format_values(values: Option<&BTreeMap<String, String>>) -> String {
    values
        .map(|values| {
            values
                .iter()
                .map(|(bucket, value)| format!("{bucket}={value}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// Pads every column to its widest cell.
fn align(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|cell| cell.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let mut out = String::new();
    let header: Vec<String> = header.iter().map(|cell| (*cell).to_string()).collect();
    for row in std::iter::once(&header).chain(rows) {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
