// crates/layerconf-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Write config and key files into temp directories.
// ============================================================================

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use layerconf_config::ConfigError;
use layerconf_config::LayerconfConfig;

pub type TestResult = Result<(), String>;

/// Asserts that a config result failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

/// Minimal valid config rooted at `dir`.
pub fn minimal_toml(dir: &Path) -> String {
    format!(
        "[database]\npath = \"{}\"\n\n[encryption]\nkey_file = \"{}\"\n",
        dir.join("store.db").display(),
        dir.join("store.key").display()
    )
}

/// Writes `content` to `name` under `dir`.
pub fn write(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Parses TOML text into a config.
pub fn parse(content: &str) -> Result<LayerconfConfig, ConfigError> {
    LayerconfConfig::parse(content)
}
