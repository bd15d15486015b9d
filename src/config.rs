//! Runtime configuration loaded from TOML and the environment

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::logging::{self, LogConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub invoke: InvokeConfig,

    #[serde(default)]
    pub heap: HeapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub show_spans: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Drop the host lock for the duration of each native call
    #[serde(default = "default_true")]
    pub release_host_lock: bool,

    /// Log when a bare integer matches no enum member (it is accepted either way)
    #[serde(default = "default_true")]
    pub warn_on_unknown_enum: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Log live native allocations when the runtime is dropped
    #[serde(default = "default_false")]
    pub report_leaks_on_drop: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            show_spans: false,
        }
    }
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            release_host_lock: true,
            warn_on_unknown_enum: true,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            report_leaks_on_drop: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }

impl RuntimeConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Defaults with `GIMARSHAL_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `GIMARSHAL_*` environment overrides on top of this config
    pub fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("GIMARSHAL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(path) = std::env::var("GIMARSHAL_LOG_FILE") {
            self.logging.file = Some(path);
        }
        if let Some(v) = env_bool("GIMARSHAL_LOG_JSON") {
            self.logging.json = v;
        }
        if let Some(v) = env_bool("GIMARSHAL_LOG_SPANS") {
            self.logging.show_spans = v;
        }
        if let Some(v) = env_bool("GIMARSHAL_RELEASE_HOST_LOCK") {
            self.invoke.release_host_lock = v;
        }
        if let Some(v) = env_bool("GIMARSHAL_REPORT_LEAKS") {
            self.heap.report_leaks_on_drop = v;
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: logging::parse_level(&self.level),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.show_spans,
        }
    }
}
