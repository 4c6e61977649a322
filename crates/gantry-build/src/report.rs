//! Per-file outcomes and task reports.

use std::path::PathBuf;
use std::time::Instant;

use crate::graph::TaskKind;
use crate::pipeline::BuildError;

/// A source file that failed to transform.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    /// Source file that failed
    pub source: PathBuf,
    /// Compiler message
    pub message: String,
}

/// Result of processing one file: the written output, or why it failed.
pub type FileOutcome = Result<PathBuf, FileFailure>;

/// Summary of one task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task that ran
    pub task: TaskKind,

    /// Files written
    pub outputs: Vec<PathBuf>,

    /// Files that failed to transform
    pub failures: Vec<FileFailure>,

    /// Run time in milliseconds
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Receives build notifications. The live-reload hub implements this.
pub trait BuildEvents: Send + Sync {
    /// A single file failed; the task keeps going.
    fn file_failed(&self, _task: TaskKind, _failure: &FileFailure) {}

    /// A task run completed (possibly with per-file failures).
    fn task_finished(&self, _report: &TaskReport) {}

    /// A task run aborted.
    fn task_failed(&self, _task: TaskKind, _error: &BuildError) {}
}

/// Event sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl BuildEvents for NoEvents {}

/// Catches per-file errors for one task run.
///
/// Failures are logged, forwarded to the event sink and collected into the
/// report; they never abort the run.
pub struct ErrorGuard<'a> {
    events: &'a dyn BuildEvents,
    report: TaskReport,
    started: Instant,
}

impl<'a> ErrorGuard<'a> {
    pub fn new(task: TaskKind, events: &'a dyn BuildEvents) -> Self {
        Self {
            events,
            report: TaskReport {
                task,
                outputs: Vec::new(),
                failures: Vec::new(),
                duration_ms: 0,
            },
            started: Instant::now(),
        }
    }

    /// Record the outcome of one file.
    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            Ok(path) => self.report.outputs.push(path),
            Err(failure) => {
                tracing::error!(
                    "[{}] {}: {}",
                    self.report.task,
                    failure.source.display(),
                    failure.message
                );
                self.events.file_failed(self.report.task, &failure);
                self.report.failures.push(failure);
            }
        }
    }

    /// Close the run and return its report.
    pub fn finish(mut self) -> TaskReport {
        self.report.duration_ms = self.started.elapsed().as_millis() as u64;
        self.report
    }
}
