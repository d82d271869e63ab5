use crate::error::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Heartbeat components run by the bundled daemon
    #[serde(default)]
    pub heartbeat: Vec<HeartbeatConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShutdownConfig {
    /// Terminate the process after the exit hook has stopped all components
    #[serde(default = "default_exit_process")]
    pub exit_process: bool,

    /// Exit status used after the exit hook ran
    #[serde(default = "default_exit_code")]
    pub exit_code: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log file, written through a non-blocking appender
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HeartbeatConfig {
    pub name: String,

    /// Interval between heartbeats in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl SupervisorConfig {
    /// Load configuration from a specific file path.
    ///
    /// Defaults are overridden by the file (if present), which is overridden
    /// by `SUPERVISOR__SECTION__KEY` environment variables.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("shutdown.exit_process", default_exit_process())?
            .set_default("shutdown.exit_code", default_exit_code() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("SUPERVISOR")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: SupervisorConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0..=255).contains(&self.shutdown.exit_code) {
            return Err(invalid(format!(
                "Shutdown exit_code must be between 0 and 255, got {}",
                self.shutdown.exit_code
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Unknown log level '{}'",
                self.logging.level
            )));
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Unknown log format '{}'",
                self.logging.format
            )));
        }

        let mut names = HashSet::new();
        for heartbeat in &self.heartbeat {
            if heartbeat.name.trim().is_empty() {
                return Err(invalid("Heartbeat name must not be empty".to_string()));
            }
            if heartbeat.interval_ms == 0 {
                return Err(invalid(format!(
                    "Heartbeat '{}' interval_ms must be greater than 0",
                    heartbeat.name
                )));
            }
            if !names.insert(heartbeat.name.as_str()) {
                return Err(invalid(format!(
                    "Duplicate heartbeat name '{}'",
                    heartbeat.name
                )));
            }
        }

        Ok(())
    }

    /// Render as TOML, the format `load_from_file` reads
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn invalid(message: String) -> crate::error::SupervisorError {
    ConfigError::Message(message).into()
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            exit_process: default_exit_process(),
            exit_code: default_exit_code(),
        }
    }
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

// Default value functions
fn default_exit_process() -> bool {
    true
}
fn default_exit_code() -> i32 {
    0
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}
