//! Opaque handle to the top-level pipeline the engine executes.

use std::fmt::Debug;
use std::sync::Arc;

pub trait Pipeline: Send + Sync + Debug {
    fn id(&self) -> &str;

    fn description(&self) -> &str;
}

pub type PipelineHandle = Arc<dyn Pipeline>;

/// Placeholder root used until the embedding application supplies its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPipeline {
    id: String,
    description: String,
}

impl RootPipeline {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

impl Default for RootPipeline {
    fn default() -> Self {
        Self::new(
            "root",
            "A pipeline that contains all other pipelines of the project",
        )
    }
}

impl Pipeline for RootPipeline {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }
}
