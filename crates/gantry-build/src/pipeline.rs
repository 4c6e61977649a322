//! Task execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::command::{CommandError, CommandRunner, SystemRunner};
use crate::config::PathConfig;
use crate::copy::AssetCopier;
use crate::graph::{Target, TaskGraph, TaskKind};
use crate::report::{BuildEvents, ErrorGuard, FileFailure, NoEvents, TaskReport};
use crate::scripts::ScriptBuilder;
use crate::styles::StyleBuilder;
use crate::vendor::VendorFetcher;
use crate::views::ViewBuilder;

/// Errors that abort a task run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to transform {}: {message}", .path.display())]
    Transform { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task graph error: {0}")]
    Graph(String),
}

/// Runs a single task. The watch loop drives builds through this trait.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: TaskKind) -> Result<TaskReport, BuildError>;
}

/// Result of running a target.
#[derive(Debug)]
pub struct BuildSummary {
    /// One report per task, in the order they ran
    pub reports: Vec<TaskReport>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

impl BuildSummary {
    pub fn files_written(&self) -> usize {
        self.reports.iter().map(|r| r.outputs.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileFailure> {
        self.reports.iter().flat_map(|r| r.failures.iter())
    }
}

/// Runs build tasks against one configuration.
pub struct Pipeline {
    config: Arc<PathConfig>,
    graph: TaskGraph,
    runner: Arc<dyn CommandRunner>,
    events: Arc<dyn BuildEvents>,
}

impl Pipeline {
    /// Create a pipeline with the standard task graph.
    pub fn new(config: Arc<PathConfig>) -> Self {
        Self {
            config,
            graph: TaskGraph::default(),
            runner: Arc::new(SystemRunner),
            events: Arc::new(NoEvents),
        }
    }

    /// Use a different command runner for external commands.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Send build notifications to `events`.
    pub fn with_events(mut self, events: Arc<dyn BuildEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Run `target`, dependencies first.
    ///
    /// Stops at the first fatal error; per-file failures are collected in
    /// the reports and the remaining tasks still run.
    pub fn run(&self, target: Target) -> Result<BuildSummary, BuildError> {
        let start = Instant::now();
        let plan = self.graph.plan(target)?;

        let reports = plan
            .into_iter()
            .map(|task| self.run_task(task))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BuildSummary {
            reports,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: self.config.output_dir(),
        })
    }

    /// Run one task without its dependencies.
    pub fn run_task(&self, task: TaskKind) -> Result<TaskReport, BuildError> {
        tracing::info!("Starting '{}'...", task);

        let mut guard = ErrorGuard::new(task, self.events.as_ref());
        let result = self.dispatch(task, &mut guard);
        let report = guard.finish();

        match result {
            Ok(()) => {
                tracing::info!(
                    "Finished '{}' after {}ms ({} written, {} failed)",
                    task,
                    report.duration_ms,
                    report.outputs.len(),
                    report.failures.len()
                );
                self.events.task_finished(&report);
                Ok(report)
            }
            Err(e) => {
                tracing::error!("'{}' failed: {}", task, e);
                self.events.task_failed(task, &e);
                Err(e)
            }
        }
    }

    fn dispatch(&self, task: TaskKind, guard: &mut ErrorGuard<'_>) -> Result<(), BuildError> {
        let config = self.config.as_ref();
        match task {
            TaskKind::Vendor => VendorFetcher::new(config, self.runner.as_ref()).fetch(guard),
            TaskKind::Views => ViewBuilder::new(config).build(guard),
            TaskKind::Stylesheets => StyleBuilder::new(config).build(guard),
            TaskKind::Javascripts => ScriptBuilder::new(config).build(guard),
            TaskKind::Images => AssetCopier::new(config, &config.images).copy(guard),
            TaskKind::Fonts => AssetCopier::new(config, &config.fonts).copy(guard),
        }
    }
}

impl TaskExecutor for Pipeline {
    fn execute(&self, task: TaskKind) -> Result<TaskReport, BuildError> {
        self.run_task(task)
    }
}
