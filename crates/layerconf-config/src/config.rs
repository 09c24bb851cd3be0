// crates/layerconf-config/src/config.rs
// ============================================================================
// Module: Layerconf Configuration
// Description: Configuration loading and validation for the layerconf store.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: layerconf-db, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. The encryption key is a
//! separate file holding 64 hex characters; it is read once at startup and a
//! missing or malformed key is fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use layerconf_db::DatabaseConfig;
use layerconf_db::Encryptor;
use layerconf_db::EventLevel;
use layerconf_db::FileEventSink;
use layerconf_db::NoopEventSink;
use layerconf_db::StderrEventSink;
use layerconf_db::StoreEventSink;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "layerconf.toml";
/// Environment variable naming the configuration file.
pub(crate) const CONFIG_ENV_VAR: &str = "LAYERCONF_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum key file size in bytes.
pub(crate) const MAX_KEY_FILE_SIZE: usize = 4096;
/// Number of hex characters in an encryption key.
pub(crate) const KEY_HEX_LENGTH: usize = 64;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum `SQLite` busy timeout in milliseconds.
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Top-level layerconf configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerconfConfig {
    /// Database location and tuning.
    pub database: DatabaseConfig,
    /// Encryption key provisioning.
    pub encryption: EncryptionConfig,
    /// Event log sink.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LayerconfConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, then the `LAYERCONF_CONFIG` environment
    /// variable, then `layerconf.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::parse(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        self.encryption.validate()?;
        self.logging.validate()
    }
}

/// Encryption key provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// File holding the hex encoded 32-byte key.
    pub key_file: PathBuf,
}

impl EncryptionConfig {
    /// Validates the key file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is empty or too long.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("encryption.key_file", &self.key_file.to_string_lossy())
    }

    /// Reads the key file and builds the column encryptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, oversized, or does
    /// not hold exactly 64 hex characters.
    pub fn load_key(&self) -> Result<Encryptor, ConfigError> {
        let bytes = fs::read(&self.key_file).map_err(|err| {
            ConfigError::Io(format!("encryption.key_file {}: {err}", self.key_file.display()))
        })?;
        if bytes.len() > MAX_KEY_FILE_SIZE {
            return Err(ConfigError::Invalid(
                "encryption.key_file exceeds size limit".to_string(),
            ));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("encryption.key_file must be utf-8".to_string()))?;
        let key = content.trim();
        if key.len() != KEY_HEX_LENGTH || !key.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(ConfigError::Invalid(format!(
                "encryption.key_file must contain exactly {KEY_HEX_LENGTH} hex characters"
            )));
        }
        Encryptor::new(key).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// Event log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Events are discarded.
    None,
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Event destination.
    #[serde(default)]
    pub sink: LogSink,
    /// Log file path, required for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Minimum level written.
    #[serde(default)]
    pub level: EventLevel,
}

impl LoggingConfig {
    /// Validates sink and path consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file sink has no path or another sink
    /// names one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSink::File, Some(path)) => validate_path_string("logging.path", &path.to_string_lossy()),
            (LogSink::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSink::Stderr | LogSink::None, Some(_)) => Err(ConfigError::Invalid(
                "logging.path is only valid for the file sink".to_string(),
            )),
            (LogSink::Stderr | LogSink::None, None) => Ok(()),
        }
    }

    /// Builds the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn StoreEventSink>, ConfigError> {
        match (self.sink, &self.path) {
            (LogSink::File, Some(path)) => {
                let sink = FileEventSink::new(path, self.level)
                    .map_err(|err| ConfigError::Io(format!("logging.path: {err}")))?;
                Ok(Arc::new(sink))
            }
            (LogSink::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSink::Stderr, _) => Ok(Arc::new(StderrEventSink::new(self.level))),
            (LogSink::None, _) => Ok(Arc::new(NoopEventSink)),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the database section.
fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    validate_path_string("database.path", &database.path.to_string_lossy())?;
    if database.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "database.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
        )));
    }
    database.validate().map_err(|err| ConfigError::Invalid(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::MAX_PATH_COMPONENT_LENGTH;
    use super::MAX_TOTAL_PATH_LENGTH;
    use super::validate_path_string;

    #[test]
    fn validate_path_string_rejects_blank_values() {
        let error = validate_path_string("database.path", "   ").unwrap_err();
        assert!(error.to_string().contains("database.path must be non-empty"));
    }

    #[test]
    fn validate_path_string_enforces_limits() {
        assert!(validate_path_string("p", &"a".repeat(MAX_TOTAL_PATH_LENGTH + 1)).is_err());
        assert!(validate_path_string("p", &"a".repeat(MAX_PATH_COMPONENT_LENGTH + 1)).is_err());
        assert!(validate_path_string("p", &"a".repeat(MAX_PATH_COMPONENT_LENGTH)).is_ok());
        assert!(validate_path_string("p", "  ./data/layerconf.db  ").is_ok());
    }
}
