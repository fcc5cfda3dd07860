//! Pipeline lifecycle events and the handler trait that receives them.
//!
//! The engine emits one [`PipelineEvent`] per state change of a run or node
//! and feeds it to every handler in the resolved list. Handlers decide on
//! their own what to do with it (announce failures in a chat, echo to the
//! console, ...).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;

use crate::error::ConfigResult;

/// How an output line should be rendered by notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Standard,
    Verbatim,
    Italics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        node_path: Vec<String>,
        start_time: DateTime<Utc>,
        pid: u32,
        is_root_pipeline: bool,
        node_ids: Vec<String>,
        interactively_started: bool,
        user: Option<String>,
    },

    RunFinished {
        node_path: Vec<String>,
        end_time: DateTime<Utc>,
        succeeded: bool,
        interactively_started: bool,
    },

    NodeStarted {
        node_path: Vec<String>,
        start_time: DateTime<Utc>,
        is_pipeline: bool,
    },

    NodeFinished {
        node_path: Vec<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        is_pipeline: bool,
        succeeded: bool,
    },

    Output {
        node_path: Vec<String>,
        timestamp: DateTime<Utc>,
        message: String,
        format: OutputFormat,
        is_error: bool,
    },
}

impl PipelineEvent {
    /// Builds an output event stamped with the current time.
    pub fn output(node_path: Vec<String>, message: impl Into<String>, is_error: bool) -> Self {
        Self::Output {
            node_path,
            timestamp: Utc::now(),
            message: message.into(),
            format: OutputFormat::Standard,
            is_error,
        }
    }

    pub fn node_path(&self) -> &[String] {
        match self {
            Self::RunStarted { node_path, .. }
            | Self::RunFinished { node_path, .. }
            | Self::NodeStarted { node_path, .. }
            | Self::NodeFinished { node_path, .. }
            | Self::Output { node_path, .. } => node_path,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunFinished { .. } => "run_finished",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeFinished { .. } => "node_finished",
            Self::Output { .. } => "output",
        }
    }

    /// Whether the event reports a failed run or node, or error output.
    pub const fn is_failure(&self) -> bool {
        match self {
            Self::RunFinished { succeeded, .. } | Self::NodeFinished { succeeded, .. } => {
                !*succeeded
            }
            Self::Output { is_error, .. } => *is_error,
            Self::RunStarted { .. } | Self::NodeStarted { .. } => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Receives pipeline lifecycle events and performs a notification side effect.
pub trait EventHandler: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn handle_event(&self, event: &PipelineEvent) -> ConfigResult<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Joins a node path the way it appears in UI urls.
pub fn format_node_path(node_path: &[String]) -> String {
    node_path.join("/")
}
