//! Tracing setup: JSON lines in a rolling file plus compact stderr output.
//!
//! The number of retained log files follows `run_log_retention_in_days`, so
//! with daily rotation the logs cover the same window as the run history.

use std::{
    path::{Component, Path, PathBuf},
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub max_log_files: usize,
    pub rotation: LogRotation,
    pub stderr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("pipelines"),
            log_level: CompactString::const_new("info"),
            max_log_files: 30,
            rotation: LogRotation::Daily,
            stderr: true,
        }
    }
}

impl LoggerConfig {
    /// Log files go to `<data_dir>/logs` and are kept for the run log retention period.
    pub fn for_pipeline(config: &PipelineConfig) -> Self {
        Self {
            log_dir: config.data_dir().join("logs"),
            max_log_files: usize::try_from(config.run_log_retention_in_days()).unwrap_or(usize::MAX),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.config.log_level = CompactString::new(level);
        self
    }

    /// Installs the global subscriber. Keep the returned guard alive until
    /// shutdown, dropping it flushes the file writer.
    pub async fn build(self) -> Result<WorkerGuard> {
        validate_config(&self.config)?;

        if LOGGER_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(LoggingError::AlreadyInitialized.into());
        }

        let result = self.install().await;
        if result.is_err() {
            LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn install(self) -> Result<WorkerGuard> {
        let config = self.config;
        setup_log_directory(&config.log_dir).await?;

        let rotation = match config.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };

        let file_appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(config.log_file_prefix.as_str())
            .filename_suffix("jsonl")
            .max_log_files(config.max_log_files)
            .build(&config.log_dir)
            .context("Failed to create file appender")?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let level = config.log_level.clone();
        let make_filter = || -> Result<EnvFilter> {
            Ok(EnvFilter::from_default_env()
                .add_directive(Directive::from_str(&level).context("Invalid log level in config")?))
        };

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(make_filter()?);

        let stderr_layer = config.stderr.then(|| {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
        });

        tracing_subscriber::registry()
            .with(json_layer)
            .with(stderr_layer.with_filter(make_filter()?))
            .try_init()
            .context("Failed to install global tracing subscriber")?;

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_config(config: &LoggerConfig) -> Result<()> {
    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "At least one log file must be retained".to_string(),
        )
        .into());
    }

    if config.log_file_prefix.is_empty() {
        return Err(
            LoggingError::ConfigError("Log file prefix must not be empty".to_string()).into(),
        );
    }

    validate_log_directory(&config.log_dir)?;
    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<()> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()).into());
    }

    if path.components().any(|c| c == Component::ParentDir) {
        return Err(LoggingError::InvalidLogDirectory(
            "Path contains parent directory references".to_string(),
        )
        .into());
    }

    Ok(())
}

async fn setup_log_directory(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        TokioFs::create_dir_all(log_dir)
            .await
            .map_err(LoggingError::from)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }
    Ok(())
}

pub async fn init_logging_for(config: &PipelineConfig) -> Result<WorkerGuard> {
    LoggerBuilder::new()
        .with_config(LoggerConfig::for_pipeline(config))
        .build()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_of(config: &LoggerConfig) -> LoggingError {
        validate_config(config)
            .unwrap_err()
            .downcast::<LoggingError>()
            .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&LoggerConfig::default()).is_ok());
    }

    #[test]
    fn test_retention_follows_pipeline_config() {
        let pipeline = PipelineConfig::new()
            .with_run_log_retention_in_days(|| 7)
            .with_data_dir(|| PathBuf::from("/srv/etl/data"));

        let config = LoggerConfig::for_pipeline(&pipeline);
        assert_eq!(config.max_log_files, 7);
        assert_eq!(config.log_dir, PathBuf::from("/srv/etl/data/logs"));
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let config = LoggerConfig {
            max_log_files: 0,
            ..LoggerConfig::default()
        };
        assert!(matches!(error_of(&config), LoggingError::ConfigError(_)));
    }

    #[test]
    fn test_parent_dir_is_rejected() {
        let config = LoggerConfig {
            log_dir: PathBuf::from("../outside"),
            ..LoggerConfig::default()
        };
        assert!(matches!(
            error_of(&config),
            LoggingError::InvalidLogDirectory(_)
        ));
    }

    #[test]
    fn test_empty_dir_is_rejected() {
        let config = LoggerConfig {
            log_dir: PathBuf::new(),
            ..LoggerConfig::default()
        };
        assert!(matches!(
            error_of(&config),
            LoggingError::InvalidLogDirectory(_)
        ));
    }
}
