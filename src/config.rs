//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub csv: CsvConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Binary store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_sync_on_close")]
    pub sync_on_close: bool,
}

fn default_sync_on_close() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_close: default_sync_on_close(),
        }
    }
}

/// CSV codec configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CsvConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Dimensions kept by aggregated export; empty drops the finest one
    #[serde(default)]
    pub aggregate_to: Vec<String>,

    /// Export calendar coordinates as one ISO `date`/`datetime` column
    #[serde(default)]
    pub datetime_column: bool,
}

fn default_delimiter() -> char {
    ','
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            aggregate_to: Vec::new(),
            datetime_column: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// First existing file among the standard config locations
    pub fn default_path() -> Option<PathBuf> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("almanac").join("config.toml")),
            Some(PathBuf::from("/etc/almanac/config.toml")),
            Some(PathBuf::from("./almanac.toml")),
        ];

        config_paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(level) = lookup("ALMANAC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("ALMANAC_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(delimiter) = lookup("ALMANAC_CSV_DELIMITER") {
            let mut chars = delimiter.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.csv.delimiter = c,
                _ => {
                    return Err(ConfigError::Env {
                        var: "ALMANAC_CSV_DELIMITER".to_string(),
                        error: format!("expected a single character, got {:?}", delimiter),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid environment variable {var}: {error}")]
    Env { var: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Almanac Configuration
#
# Environment variables override these settings:
# - ALMANAC_LOG_LEVEL
# - ALMANAC_LOG_FORMAT
# - ALMANAC_CSV_DELIMITER

[store]
# Fsync data files when a store is closed
sync_on_close = true

[csv]
# Single-character field delimiter
delimiter = ","

# Dimensions kept by aggregated export, coarsest first.
# Empty collapses only the finest dimension (e.g. hourly -> daily).
aggregate_to = []

# Export coordinates as a single ISO "date" or "datetime" column.
# Import detects either form from the header.
datetime_column = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/almanac/almanac.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert!(config.store.sync_on_close);
        assert_eq!(config.csv.delimiter, ',');
        assert!(config.csv.aggregate_to.is_empty());
        assert!(!config.csv.datetime_column);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse("[csv]\naggregate_to = [\"year\", \"month\"]\n").unwrap();
        assert_eq!(config.csv.aggregate_to, vec!["year", "month"]);
        assert_eq!(config.csv.delimiter, ',');
        assert!(config.store.sync_on_close);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("almanac.toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        std::fs::write(&path, "[csv]\ndelimiter = 5\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        std::fs::write(&path, "[logging]\nformat = \"json\"\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().logging.format, "json");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ALMANAC_LOG_LEVEL", "debug"),
            ("ALMANAC_LOG_FORMAT", "json"),
            ("ALMANAC_CSV_DELIMITER", ";"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.csv.delimiter, ';');

        let mut untouched = Config::default();
        untouched.apply_overrides(|_| None).unwrap();
        assert_eq!(untouched.csv.delimiter, ',');
        assert_eq!(untouched.logging.level, "info");
    }

    #[test]
    fn test_multi_char_delimiter_override_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == "ALMANAC_CSV_DELIMITER").then(|| "::".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
        assert!(err.to_string().contains("ALMANAC_CSV_DELIMITER"));
        assert_eq!(config.csv.delimiter, ',');

        let err = config
            .apply_overrides(|name| (name == "ALMANAC_CSV_DELIMITER").then(String::new))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
