//! Development server command.

use std::sync::Arc;

use anyhow::{Context, Result};
use gantry_build::{OverlapPolicy, PathConfig};
use gantry_server::{DevServer, DevServerConfig};

/// Run the watch loop and serve the output directory.
pub async fn run(
    config: Arc<PathConfig>,
    port: Option<u16>,
    open: bool,
    overlap: Option<OverlapPolicy>,
) -> Result<()> {
    let mut server_config = DevServerConfig::from_paths(&config);
    server_config.open = open;
    if let Some(port) = port {
        server_config.port = port;
    }

    let watch = super::watch::start(config, overlap).await?;

    tracing::info!("Starting development server on port {}", server_config.port);
    let server = DevServer::new(server_config).start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down...");
    server.shutdown().await?;
    watch.shutdown().await?;

    Ok(())
}
