// crates/layerconf-config/src/lib.rs
// ============================================================================
// Module: Layerconf Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for layerconf.toml semantics.
// Dependencies: layerconf-db, serde, toml
// ============================================================================

//! ## Overview
//! `layerconf-config` defines the configuration model for the layerconf
//! store: database location and tuning, the encryption key file, and the
//! event log sink. Loading is strict and fails closed.
//!
//! Security posture: config inputs and key files are untrusted and size
//! limited before parsing.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
