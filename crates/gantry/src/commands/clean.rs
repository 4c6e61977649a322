//! Clean command.

use anyhow::Result;
use gantry_build::PathConfig;

/// Delete the output directory.
pub fn run(config: std::sync::Arc<PathConfig>) -> Result<()> {
    let removed = gantry_build::clean(&config.output_dir())?;

    let names: Vec<String> = removed.iter().map(|p| p.display().to_string()).collect();
    tracing::info!("Deleted: {}", names.join(", "));

    Ok(())
}
