//! Configuration for the synchronization layer
//!
//! Loaded from TOML and validated on load. Durations are written as seconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Database file; resolved from the environment or platform data dir when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Directory name used when a module name sanitizes to nothing
    #[serde(default = "default_fallback_module_name")]
    pub fallback_module_name: String,

    /// Retention limits for bounded stores
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Retention limits per bounded store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run sweeps as detached background tasks instead of inline
    #[serde(default = "default_background")]
    pub background: bool,

    pub file_handles: RetentionLimits,
    pub directory_handles: RetentionLimits,
    pub recent_documents: RetentionLimits,
}

/// Count and age bound for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionLimits {
    /// Maximum number of records kept (most recently accessed win)
    pub max_count: usize,

    /// Maximum age since last access
    #[serde(with = "serde_duration")]
    pub max_age: Duration,
}

const DAY: u64 = 86400;

impl RetentionLimits {
    pub fn new(max_count: usize, max_age: Duration) -> Self {
        Self { max_count, max_age }
    }
}

fn default_fallback_module_name() -> String {
    "unnamed-module".to_string()
}

fn default_background() -> bool {
    true
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            background: true,
            file_handles: RetentionLimits::new(100, Duration::from_secs(90 * DAY)),
            directory_handles: RetentionLimits::new(200, Duration::from_secs(180 * DAY)),
            recent_documents: RetentionLimits::new(20, Duration::from_secs(30 * DAY)),
        }
    }
}

impl RetentionConfig {
    pub fn limits(&self, store: crate::storage::BoundedStore) -> RetentionLimits {
        use crate::storage::BoundedStore;
        match store {
            BoundedStore::FileHandles => self.file_handles,
            BoundedStore::DirectoryHandles => self.directory_handles,
            BoundedStore::RecentDocuments => self.recent_documents,
        }
    }

    /// Same limits, sweeps run inline (deterministic ordering for tests and the CLI)
    pub fn inline(mut self) -> Self {
        self.background = false;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            fallback_module_name: default_fallback_module_name(),
            retention: RetentionConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_limits("file_handles", &self.retention.file_handles)?;
        self.validate_limits("directory_handles", &self.retention.directory_handles)?;
        self.validate_limits("recent_documents", &self.retention.recent_documents)?;

        let fallback = crate::repository::naming::sanitize_with_fallback(
            &self.fallback_module_name,
            "",
        );
        if fallback.is_empty() || fallback != self.fallback_module_name {
            return Err(ConfigError::ValidationError(format!(
                "fallback_module_name '{}' is not a valid directory name",
                self.fallback_module_name
            )));
        }

        Ok(())
    }

    fn validate_limits(&self, name: &str, limits: &RetentionLimits) -> Result<(), ConfigError> {
        if limits.max_count == 0 || limits.max_count > 10000 {
            return Err(ConfigError::ValidationError(format!(
                "{}: max_count must be between 1 and 10000",
                name
            )));
        }

        if limits.max_age < Duration::from_secs(3600) {
            return Err(ConfigError::ValidationError(format!(
                "{}: max_age must be at least 1 hour",
                name
            )));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Database path from config, `MODSYNC_DB_PATH`, or the platform data dir
    pub fn resolve_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(|| std::env::var("MODSYNC_DB_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(default_database_path)
    }
}

/// Default database path using the platform local data directory
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modsync")
        .join("modsync.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_count_zero() {
        let mut config = SyncConfig::default();
        config.retention.recent_documents.max_count = 0;

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("recent_documents: max_count must be between"));
    }

    #[test]
    fn test_validate_max_age_too_short() {
        let mut config = SyncConfig::default();
        config.retention.file_handles.max_age = Duration::from_secs(60);

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_age must be at least 1 hour"));
    }

    #[test]
    fn test_validate_fallback_name() {
        let mut config = SyncConfig::default();
        config.fallback_module_name = "bad/name".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            database_path = "/tmp/modsync.db"

            [retention]
            background = false

            [retention.file_handles]
            max_count = 10
            max_age = 86400

            [retention.directory_handles]
            max_count = 20
            max_age = 172800

            [retention.recent_documents]
            max_count = 5
            max_age = 3600
        "#;

        let config = SyncConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/modsync.db")));
        assert!(!config.retention.background);
        assert_eq!(config.retention.recent_documents.max_count, 5);
        assert_eq!(config.retention.file_handles.max_age, Duration::from_secs(86400));
        assert_eq!(config.fallback_module_name, "unnamed-module");
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: SyncConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(
            config.retention.directory_handles,
            deserialized.retention.directory_handles
        );
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let mut config = SyncConfig::default();
        config.database_path = Some(PathBuf::from("/data/x.db"));
        assert_eq!(config.resolve_database_path(), PathBuf::from("/data/x.db"));
    }
}
