//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come
//! from the `[logging]` section of the configuration; `HOSTPDR_LOG*`
//! environment variables win over it.

use crate::error::ApiError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive override, e.g. `HOSTPDR_LOG=hostpdr::fetch=trace`
pub const LOG_ENV: &str = "HOSTPDR_LOG";
pub const LOG_FORMAT_ENV: &str = "HOSTPDR_LOG_FORMAT";
pub const LOG_OUTPUT_ENV: &str = "HOSTPDR_LOG_OUTPUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| ApiError::ConfigError(format!("unknown log format '{}'", s)))
    }
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| ApiError::ConfigError(format!("unknown log output '{}'", s)))
    }
}

/// `[logging]` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level: trace, debug, info, warn, error, off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Used when `output = "file"`
    pub file: PathBuf,
    /// ANSI colors for text on a terminal
    pub color: bool,
    /// Per-target levels, e.g. `"hostpdr::merge" = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: PathBuf::from("/var/log/hostpdr/hostpdr.log"),
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Format after applying `HOSTPDR_LOG_FORMAT`
    fn effective_format(&self) -> Result<LogFormat, ApiError> {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(self.format),
        }
    }

    /// Output after applying `HOSTPDR_LOG_OUTPUT`
    fn effective_output(&self) -> Result<LogOutput, ApiError> {
        match std::env::var(LOG_OUTPUT_ENV) {
            Ok(value) => value.parse(),
            Err(_) => Ok(self.output),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, ApiError> {
        if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
            return Ok(filter);
        }
        let mut filter = EnvFilter::new(&self.level);
        if self.level == "off" {
            return Ok(filter);
        }
        for (target, level) in &self.modules {
            let directive = format!("{}={}", target, level)
                .parse()
                .map_err(|e| ApiError::ConfigError(format!("bad log directive for {}: {}", target, e)))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn writer(&self, output: LogOutput) -> Result<BoxMakeWriter, ApiError> {
        Ok(match output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => {
                if let Some(dir) = self.file.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(&self.file)?;
                BoxMakeWriter::new(std::sync::Mutex::new(file))
            }
        })
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ApiError> {
    let filter = config.env_filter()?;
    let format = config.effective_format()?;
    let output = config.effective_output()?;
    let writer = config.writer(output)?;

    let registry = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(config.color && output != LogOutput::File)
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|e| ApiError::ConfigError(format!("logging already initialized: {}", e)))
}
