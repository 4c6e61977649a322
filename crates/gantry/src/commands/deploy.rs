//! Deploy command.

use std::sync::Arc;

use anyhow::Result;
use gantry_build::{PathConfig, SystemRunner};
use gantry_deploy::DeployWorkflow;

/// Publish the output directory.
pub async fn run(config: Arc<PathConfig>) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || {
        DeployWorkflow::new(&config, &SystemRunner).run()
    })
    .await??;

    tracing::info!(
        "Deployed {} entries, removed {} paths, back on {}",
        report.moved.len(),
        report.removed.len(),
        report.branch
    );

    Ok(())
}
