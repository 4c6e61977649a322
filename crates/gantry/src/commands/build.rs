//! Build command.

use std::sync::Arc;

use anyhow::Result;
use gantry_build::{PathConfig, Pipeline, Target};

/// Run the build command for `target`.
pub async fn run(config: Arc<PathConfig>, target: Target) -> Result<()> {
    tracing::info!("Building...");

    let summary = tokio::task::spawn_blocking(move || Pipeline::new(config).run(target)).await??;

    tracing::info!(
        "Built {} files across {} tasks in {}ms",
        summary.files_written(),
        summary.reports.len(),
        summary.duration_ms
    );

    tracing::info!("Output: {}", summary.output_dir.display());

    let failed = summary.failures().count();
    if failed > 0 {
        anyhow::bail!("{} file(s) failed to build", failed);
    }

    Ok(())
}
