//! Error types for configuration loading and event handler construction

use compact_str::CompactString;
use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid Slack token: {reason}")]
    InvalidSlackToken { reason: CompactString },

    #[error("Failed to construct event handler '{handler}': {reason}")]
    HandlerConstruction {
        handler: CompactString,
        reason: CompactString,
    },

    #[error("Notification via '{handler}' failed: {reason}")]
    Notification {
        handler: CompactString,
        reason: CompactString,
    },

    #[error("Failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

impl ConfigError {
    #[inline]
    pub fn invalid_slack_token(reason: impl Into<CompactString>) -> Self {
        Self::InvalidSlackToken {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn handler_construction(
        handler: impl Into<CompactString>,
        reason: impl Into<CompactString>,
    ) -> Self {
        Self::HandlerConstruction {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn notification(handler: impl Into<CompactString>, reason: impl Into<CompactString>) -> Self {
        Self::Notification {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures raised while building handlers, which callers treat as fatal at startup
    #[inline]
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlackToken { .. } | Self::HandlerConstruction { .. }
        )
    }
}
