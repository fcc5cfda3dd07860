//! # pipeline-config - Configuration of data integration pipelines
//!
//! Supplies the settings a pipeline engine reads while scheduling and
//! running pipelines, and assembles the event handlers that get notified
//! about runs.
//!
//! ## Key Features
//! - One independently overridable provider per setting, with total defaults
//! - Lazily resolved, cached event handler list
//! - Fallback from the deprecated `slack_token` to a Slack handler
//! - TOML config file overrides and tracing setup

pub mod config;
pub mod config_file;
pub mod deprecation;
pub mod error;
pub mod events;
pub mod logging;
pub mod masks;
pub mod notification;
pub mod pipeline;
pub mod resolver;

// Re-export main types for easy use
pub use config::{ConfigSnapshot, PipelineConfig, Provider};
pub use config_file::ConfigFile;
pub use error::{ConfigError, ConfigResult};
pub use events::{EventHandler, OutputFormat, PipelineEvent};
pub use logging::{LoggerBuilder, LoggerConfig};
pub use masks::PasswordMasks;
pub use pipeline::{Pipeline, PipelineHandle, RootPipeline};
pub use resolver::{EventHandlerResolver, ResolvedHandlers};
