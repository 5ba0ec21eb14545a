//! Configuration for the endorsement pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How a terminal stage without a configured outcome resolves its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResolution {
    /// Fall back to matching the stage name ("not endorsed", "no endorsement",
    /// "endorsed").
    #[default]
    NameFallback,
    /// Only the configured outcome counts; unconfigured terminal stages lock
    /// the endorsement as pending.
    ConfiguredOnly,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The contents were not valid configuration JSON.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value was out of range.
    #[error("Invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Configuration for [`crate::pipeline::EndorsementPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How long to wait for a row or registry lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Page size used when a listing does not ask for one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Largest page size a listing may ask for.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Decision resolution for unconfigured terminal stages.
    #[serde(default)]
    pub outcome_resolution: OutcomeResolution,
    /// Maximum length of endorsement and transition notes, in characters.
    #[serde(default = "default_max_notes_len")]
    pub max_notes_len: usize,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_page_size() -> usize {
    25
}

fn default_max_page_size() -> usize {
    200
}

fn default_max_notes_len() -> usize {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            outcome_resolution: OutcomeResolution::default(),
            max_notes_len: default_max_notes_len(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                reason: format!("must be between 1 and max_page_size ({})", self.max_page_size),
            });
        }
        Ok(())
    }

    /// Lock wait bound as a duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Sets the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let millis = timeout.as_millis() as u64;
        self.lock_timeout_ms = millis;
        self
    }

    /// Sets the outcome resolution mode.
    #[must_use]
    pub const fn with_outcome_resolution(mut self, resolution: OutcomeResolution) -> Self {
        self.outcome_resolution = resolution;
        self
    }

    /// Sets the default and maximum page sizes.
    #[must_use]
    pub const fn with_page_sizes(mut self, default_size: usize, max_size: usize) -> Self {
        self.default_page_size = default_size;
        self.max_page_size = max_size;
        self
    }

    /// Sets the notes length cap.
    #[must_use]
    pub const fn with_max_notes_len(mut self, max_len: usize) -> Self {
        self.max_notes_len = max_len;
        self
    }
}
