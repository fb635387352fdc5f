//! Configuration file loading
//!
//! The file is YAML unless its extension is `.json`. Every field has a
//! default and unknown keys are ignored, so an empty file is a valid (if
//! useless) configuration; [`Config::validate`] catches what is missing.

use std::path::Path;

use p25_link::{ModemConfig, P25Config, ReflectorConfig};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;

/// Where the configuration is read from when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/p25-hotspot.yaml";

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Minimum level: TRACE, DEBUG, INFO, WARN or ERROR
    #[serde(default = "default_level")]
    pub level: String,
    /// Append log lines to this file; empty disables file output
    #[serde(default)]
    pub file: String,
    /// Write log lines to the console
    #[serde(default = "default_true")]
    pub console: bool,
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: String::new(),
            console: true,
        }
    }
}

/// Complete hotspot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub reflector: ReflectorConfig,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub p25: P25Config,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Parse YAML configuration text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Parse JSON configuration text
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Check the values the links cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reflector.address.trim().is_empty() {
            return Err(ConfigError::Invalid("reflector.address is required".into()));
        }
        if self.reflector.radio_id == 0 {
            return Err(ConfigError::Invalid("reflector.radio_id must be nonzero".into()));
        }
        if self.reflector.keepalive_interval == 0 {
            return Err(ConfigError::Invalid(
                "reflector.keepalive_interval must be at least 1 second".into(),
            ));
        }
        if self.reflector.receive_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "reflector.receive_timeout_ms must be nonzero".into(),
            ));
        }
        if self.modem.port.trim().is_empty() {
            return Err(ConfigError::Invalid("modem.port is required".into()));
        }
        if self.modem.tx_power > 255 {
            return Err(ConfigError::Invalid(format!(
                "modem.tx_power {} is outside 0-255",
                self.modem.tx_power
            )));
        }
        if self.modem.rf_level > 255 {
            return Err(ConfigError::Invalid(format!(
                "modem.rf_level {} is outside 0-255",
                self.modem.rf_level
            )));
        }
        parse_level(&self.logging.level)?;
        Ok(())
    }
}

/// Parse a log level name, accepting `WARNING` as well as `WARN`
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return Ok(LevelFilter::WARN);
    }
    level
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", level)))
}
