//! Watch command.

use std::sync::Arc;

use anyhow::{Context, Result};
use gantry_build::{OverlapPolicy, PathConfig};
use gantry_server::{WatchHandle, WatchLoop};

/// Start the watch loop with an optional overlap override.
pub async fn start(config: Arc<PathConfig>, overlap: Option<OverlapPolicy>) -> Result<WatchHandle> {
    let mut watch = WatchLoop::new(config);
    if let Some(policy) = overlap {
        watch = watch.with_policy(policy);
    }

    Ok(watch.start().await?)
}

/// Run the watch command until Ctrl-C.
pub async fn run(config: Arc<PathConfig>, overlap: Option<OverlapPolicy>) -> Result<()> {
    let handle = start(config, overlap).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Stopping watch...");
    handle.shutdown().await?;

    Ok(())
}
