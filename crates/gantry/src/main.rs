//! Gantry CLI - build, watch, serve and deploy a static site.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gantry_build::{OverlapPolicy, PathConfig, Target, TaskKind, CONFIG_FILE};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Static-site asset pipeline: build, watch, serve and deploy")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the gantry.toml config file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every asset into the output directory (default)
    Build,

    /// Run one task and the tasks it depends on
    Task {
        /// vendor, views, stylesheets, javascripts, images or fonts
        name: TaskKind,
    },

    /// Build, then rebuild tasks as their sources change
    Watch {
        /// What to do with a change while its task is running: queue or drop
        #[arg(long)]
        overlap: Option<OverlapPolicy>,
    },

    /// Watch and serve the output directory
    Dev {
        /// Port to listen on (defaults to config or 4000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open the site in a browser
        #[arg(long)]
        open: bool,

        /// What to do with a change while its task is running: queue or drop
        #[arg(long)]
        overlap: Option<OverlapPolicy>,
    },

    /// Publish the output directory to the publishing branch
    Deploy,

    /// Delete the output directory
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = PathConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let config = Arc::new(config);

    // Execute command
    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => {
            commands::build::run(config, Target::Build).await?;
        }
        Commands::Task { name } => {
            commands::build::run(config, Target::Task(name)).await?;
        }
        Commands::Watch { overlap } => {
            commands::watch::run(config, overlap).await?;
        }
        Commands::Dev {
            port,
            open,
            overlap,
        } => {
            commands::dev::run(config, port, open, overlap).await?;
        }
        Commands::Deploy => {
            commands::deploy::run(config).await?;
        }
        Commands::Clean => {
            commands::clean::run(config)?;
        }
    }

    Ok(())
}
