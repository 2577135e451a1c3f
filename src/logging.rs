//! Structured logging via `tracing`.
//!
//! Configurable level, format (text/json), and destination (stdout/stderr/
//! file). Environment variables (`ALMANAC_LOG`, `ALMANAC_LOG_FORMAT`,
//! `ALMANAC_LOG_OUTPUT`) override the configuration file; CLI flags override
//! both (applied by the binary before calling `init_logging`).

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format, terminal destinations only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Initialize the logging system.
///
/// Maintenance output goes to stdout, so diagnostics default to stderr.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), SyncError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let base_subscriber = Registry::default().with(filter);

    let get_file_writer = || -> Result<std::fs::File, SyncError> {
        let log_file = config
            .and_then(|c| c.file.clone())
            .unwrap_or_else(|| PathBuf::from("almanac.log"));
        if let Some(parent) = log_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SyncError::Config(format!("Failed to create log directory: {}", e))
                })?;
            }
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| SyncError::Config(format!("Failed to open log file {:?}: {}", log_file, e)))
    };

    if format == "json" {
        match output.as_str() {
            "file" => {
                let writer = get_file_writer()?;
                base_subscriber
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_writer(writer),
                    )
                    .init();
            }
            "stdout" => {
                base_subscriber
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_writer(std::io::stdout),
                    )
                    .init();
            }
            _ => {
                base_subscriber
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_writer(std::io::stderr),
                    )
                    .init();
            }
        }
    } else {
        match output.as_str() {
            "file" => {
                let writer = get_file_writer()?;
                base_subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .init();
            }
            "stdout" => {
                base_subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_ansi(use_color)
                            .with_writer(std::io::stdout),
                    )
                    .init();
            }
            _ => {
                base_subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_ansi(use_color)
                            .with_writer(std::io::stderr),
                    )
                    .init();
            }
        }
    }

    Ok(())
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, SyncError> {
    if let Ok(filter) = EnvFilter::try_from_env("ALMANAC_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);
    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| SyncError::Config(format!("Invalid log directive: {}", e)))?,
            );
        }
    }
    Ok(filter)
}

/// Determine output format from config or environment
fn determine_format(config: Option<&LoggingConfig>) -> Result<String, SyncError> {
    if let Ok(format) = std::env::var("ALMANAC_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(SyncError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(format.to_string())
}

/// Determine output destination from config or environment
fn determine_output(config: Option<&LoggingConfig>) -> Result<String, SyncError> {
    let output = match std::env::var("ALMANAC_LOG_OUTPUT") {
        Ok(v) => v,
        Err(_) => config
            .map(|c| c.output.clone())
            .unwrap_or_else(default_output),
    };
    match output.as_str() {
        "stdout" | "stderr" | "file" => Ok(output),
        _ => Err(SyncError::Config(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr', or 'file')",
            output
        ))),
    }
}
