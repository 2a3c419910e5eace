use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hosted event store
    pub backend: BackendConfig,

    /// Local SQLite store
    pub store: StoreConfig,

    /// Calendar behaviour
    #[serde(default)]
    pub calendar: CalendarSettings,

    /// Retry policy for hosted store reads
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted database REST endpoint
    pub api_url: String,

    /// Project API key (optional, can be set via FAMCAL_API_KEY)
    pub api_key: Option<String>,

    /// Signed-in user's access token (optional, can be set via FAMCAL_ACCESS_TOKEN)
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the local SQLite event database
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    /// Family shown when none is given on the command line
    #[serde(default)]
    pub default_family_id: Option<String>,

    /// Days of agenda shown from today
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Quiet period before a conflict check runs
    #[serde(default = "default_conflict_debounce_ms")]
    pub conflict_debounce_ms: u64,

    /// How far ahead reminders are polled
    #[serde(default = "default_reminder_poll_minutes")]
    pub reminder_poll_minutes: u32,
}

fn default_window_days() -> u32 {
    7
}

fn default_conflict_debounce_ms() -> u64 {
    500
}

fn default_reminder_poll_minutes() -> u32 {
    15
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            default_family_id: None,
            window_days: default_window_days(),
            conflict_debounce_ms: default_conflict_debounce_ms(),
            reminder_poll_minutes: default_reminder_poll_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let database_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("famcal")
            .join("events.db");

        Self {
            backend: BackendConfig {
                api_url: "http://localhost:54321".to_string(),
                api_key: std::env::var("FAMCAL_API_KEY").ok(),
                access_token: std::env::var("FAMCAL_ACCESS_TOKEN").ok(),
            },
            store: StoreConfig { database_path },
            calendar: CalendarSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the platform config dir, creating a default if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating a default if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", config_path.display(), e)))?;

        // Secrets from the environment win over the file.
        if let Ok(key) = std::env::var("FAMCAL_API_KEY") {
            config.backend.api_key = Some(key);
        }
        if let Ok(token) = std::env::var("FAMCAL_ACCESS_TOKEN") {
            config.backend.access_token = Some(token);
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load with `ConfigError::Invalid`.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.check()?;
        Ok((config, validation))
    }

    /// Validate and fail on errors, logging any warnings.
    pub fn check(&self) -> Result<ValidationResult, ConfigError> {
        let validation = self.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(validation)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.backend.api_url, "backend.api_url", &mut result);

        if self.backend.api_key.is_none() {
            result.add_warning(
                "backend.api_key",
                "No API key configured - hosted store will be unavailable",
            );
        }

        if self.store.database_path.as_os_str().is_empty() {
            result.add_error("store.database_path", "Database path must not be empty");
        }

        if self.calendar.window_days == 0 {
            result.add_error("calendar.window_days", "Agenda window must be at least 1 day");
        } else if self.calendar.window_days > 366 {
            result.add_warning(
                "calendar.window_days",
                "Agenda window is longer than a year; recurring events stop after 100 occurrences",
            );
        }

        if self.calendar.conflict_debounce_ms > 10_000 {
            result.add_warning(
                "calendar.conflict_debounce_ms",
                "Conflict debounce is more than 10 seconds",
            );
        }

        if self.calendar.reminder_poll_minutes == 0 {
            result.add_warning("calendar.reminder_poll_minutes", "Reminder polling disabled");
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            result.add_error(
                "retry.initial_delay_ms",
                "Initial retry delay exceeds the maximum delay",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the platform config dir
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("famcal");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.backend.api_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "backend.api_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.backend.api_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_window_days() {
        let mut config = Config::default();
        config.calendar.window_days = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "calendar.window_days"));
    }

    #[test]
    fn test_retry_delays_out_of_order() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 10_000;
        config.retry.max_delay_ms = 100;
        let result = config.validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_missing_api_key_is_warning() {
        let mut config = Config::default();
        config.backend.api_key = None;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "backend.api_key"));
    }

    #[test]
    fn test_load_from_creates_default_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("famcal").join("config.toml");

        let mut created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        created.calendar.default_family_id = Some("fam-1".to_string());
        created.calendar.window_days = 14;
        created.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.calendar.default_family_id.as_deref(), Some("fam-1"));
        assert_eq!(loaded.calendar.window_days, 14);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backend]
api_url = "https://db.example.com"

[store]
database_path = "/tmp/famcal/events.db"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.calendar.window_days, 7);
        assert_eq!(config.calendar.conflict_debounce_ms, 500);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend\napi_url = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_check_rejects_invalid_config() {
        let mut config = Config::default();
        config.calendar.window_days = 0;

        let err = config.check().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("calendar.window_days")));
        assert!(Config::default().check().is_ok());
    }
}
