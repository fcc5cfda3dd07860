//! src/main.rs
//! Prints the effective pipeline configuration and the resolved event handlers.

use anyhow::{Context, Result};
use tracing::info;

use pipeline_config::{PipelineConfig, logging::init_logging_for};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = PipelineConfig::load()
        .await
        .context("Failed to load configuration")?;

    let _guard = init_logging_for(&config)
        .await
        .context("Failed to initialize logging")?;

    info!(
        parallel_tasks = config.max_number_of_parallel_tasks(),
        execution_host = config.execution_host_url().as_deref().unwrap_or("local"),
        "Configuration loaded"
    );

    let handlers = config
        .event_handlers()
        .context("Failed to construct event handlers")?;
    info!(handlers = ?handlers, "Event handlers ready");

    let rendered = config
        .snapshot()
        .to_toml()
        .context("Failed to render configuration")?;
    print!("{rendered}");

    Ok(())
}
