// crates/layerconf-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for layerconf configuration. The output is static and
//! must stay loadable by [`crate::LayerconfConfig`].

/// Returns a canonical example `layerconf.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[database]
path = "layerconf.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[encryption]
key_file = "layerconf.key"

[logging]
sink = "file"
path = "layerconf-events.log"
level = "info"
"#,
    )
}
