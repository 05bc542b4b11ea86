//! Runtime configuration for storage and logging.
//!
//! # Responsibility
//! - Hold tunables for SQLite bootstrap and pattern encoding.
//! - Parse configuration documents with serde defaults for omitted fields.
//!
//! # Invariants
//! - `pattern_delimiter` must not be alphanumeric or whitespace, otherwise
//!   domain-key parts could not be split back out of stored patterns.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Default separator between domain-key parts inside a stored pattern.
pub const DEFAULT_PATTERN_DELIMITER: char = '|';
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Document is not valid JSON or has wrongly typed fields.
    Parse(serde_json::Error),
    /// Delimiter would collide with ordinary domain-key characters.
    InvalidDelimiter(char),
    /// Busy timeout of zero disables SQLite lock waiting entirely.
    ZeroBusyTimeout,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid store config: {err}"),
            Self::InvalidDelimiter(value) => {
                write!(f, "pattern delimiter `{value}` must not be alphanumeric or whitespace")
            }
            Self::ZeroBusyTimeout => write!(f, "busy_timeout_ms must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidDelimiter(_) | Self::ZeroBusyTimeout => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Separator joining domain-key parts into one pattern string.
    pub pattern_delimiter: char,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pattern_delimiter: DEFAULT_PATTERN_DELIMITER,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields fall back to [`StoreConfig::default`].
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field-level constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern_delimiter.is_alphanumeric() || self.pattern_delimiter.is_whitespace() {
            return Err(ConfigError::InvalidDelimiter(self.pattern_delimiter));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::ZeroBusyTimeout);
        }
        Ok(())
    }
}

/// File logging configuration consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    #[serde(default = "default_level_string")]
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    /// Builds a config using the build-mode default level.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: default_level_string(),
            log_dir: log_dir.into(),
        }
    }
}

fn default_level_string() -> String {
    default_log_level().to_string()
}
