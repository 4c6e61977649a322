//! The watch loop: build once, then rebuild tasks as their sources change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gantry_build::{Glob, OverlapPolicy, PathConfig, Pipeline, Target, TaskExecutor, TaskKind};

use crate::livereload::{LiveReloadHub, LiveReloadServer};
use crate::server::{parse_addr, ServerError, ServerHandle};
use crate::watcher::FileWatcher;

/// A glob over project-relative paths and the task it triggers.
#[derive(Debug, Clone)]
pub struct WatchSubscription {
    pub glob: Glob,
    pub task: TaskKind,
}

/// The standard subscriptions for a project.
pub fn default_subscriptions(config: &PathConfig) -> Result<Vec<WatchSubscription>, ServerError> {
    let views_suffix = format!("**/*.{}", config.views.extension);
    let specs = [
        (config.views.src.as_path(), views_suffix.as_str(), TaskKind::Views),
        (config.layouts.src.as_path(), views_suffix.as_str(), TaskKind::Views),
        (config.stylesheets.src.as_path(), "**/*.scss", TaskKind::Stylesheets),
        (config.javascripts.src.as_path(), "**/*.js", TaskKind::Javascripts),
        (config.images.src.as_path(), "**/*", TaskKind::Images),
        (config.fonts.src.as_path(), "**/*", TaskKind::Fonts),
    ];

    specs
        .into_iter()
        .map(|(dir, suffix, task)| {
            Glob::within(dir, suffix)
                .map(|glob| WatchSubscription { glob, task })
                .map_err(|e| {
                    let pattern = format!("{}/{}", dir.display(), suffix);
                    ServerError::WatchError(format!("bad pattern {}: {}", pattern, e))
                })
        })
        .collect()
}

/// Distinct tasks whose subscriptions match `relative`, in subscription order.
pub fn tasks_for(subscriptions: &[WatchSubscription], relative: &Path) -> Vec<TaskKind> {
    let mut tasks = Vec::new();
    for sub in subscriptions {
        if sub.glob.is_match(relative) && !tasks.contains(&sub.task) {
            tasks.push(sub.task);
        }
    }
    tasks
}

/// What happened to a dispatched run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The run will happen (now, or after runs already queued)
    Scheduled,
    /// A run of the same task was in flight; this one was discarded
    Dropped,
}

struct Worker {
    tx: mpsc::UnboundedSender<()>,
    busy: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// One worker per task. Runs of the same task never overlap; runs of
/// different tasks may.
pub struct Dispatcher {
    policy: OverlapPolicy,
    workers: HashMap<TaskKind, Worker>,
}

impl Dispatcher {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn new(executor: Arc<dyn TaskExecutor>, policy: OverlapPolicy) -> Self {
        let workers = TaskKind::ALL
            .into_iter()
            .map(|task| (task, spawn_worker(task, Arc::clone(&executor))))
            .collect();

        Self { policy, workers }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Request a run of `task`.
    pub fn dispatch(&self, task: TaskKind) -> Dispatch {
        let worker = &self.workers[&task];

        if self.policy == OverlapPolicy::Drop && worker.busy.swap(true, Ordering::SeqCst) {
            tracing::info!("'{}' is already running, dropping change", task);
            return Dispatch::Dropped;
        }

        if worker.tx.send(()).is_err() {
            tracing::warn!("'{}' worker has stopped", task);
            return Dispatch::Dropped;
        }

        Dispatch::Scheduled
    }

    /// Stop accepting runs and wait for every scheduled run to finish.
    pub async fn shutdown(self) {
        for (task, worker) in self.workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                tracing::error!("'{}' worker panicked: {}", task, e);
            }
        }
    }
}

fn spawn_worker(task: TaskKind, executor: Arc<dyn TaskExecutor>) -> Worker {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let busy = Arc::new(AtomicBool::new(false));
    let worker_busy = Arc::clone(&busy);

    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let executor = Arc::clone(&executor);
            match tokio::task::spawn_blocking(move || executor.execute(task)).await {
                Ok(Ok(report)) => tracing::debug!(
                    "'{}' rebuilt {} files in {}ms",
                    task,
                    report.outputs.len(),
                    report.duration_ms
                ),
                // Already reported by the executor; the loop keeps going.
                Ok(Err(_)) => {}
                Err(e) => tracing::error!("'{}' run panicked: {}", task, e),
            }
            worker_busy.store(false, Ordering::SeqCst);
        }
    });

    Worker { tx, busy, handle }
}

/// Builds everything, then keeps the output in sync with the sources.
pub struct WatchLoop {
    config: Arc<PathConfig>,
    pipeline: Arc<Pipeline>,
    hub: LiveReloadHub,
    policy: OverlapPolicy,
}

impl WatchLoop {
    pub fn new(config: Arc<PathConfig>) -> Self {
        let hub = LiveReloadHub::new();
        let pipeline = Arc::new(
            Pipeline::new(Arc::clone(&config)).with_events(Arc::new(hub.clone())),
        );
        let policy = config.watch.overlap;

        Self {
            config,
            pipeline,
            hub,
            policy,
        }
    }

    /// Override the configured overlap policy.
    pub fn with_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a custom pipeline, e.g. one with a different command runner.
    /// Its events should go to [`WatchLoop::hub`] for live reload to work.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn hub(&self) -> &LiveReloadHub {
        &self.hub
    }

    /// Run the full build, start live reload and begin watching.
    ///
    /// A failing initial build is logged; watching starts regardless.
    pub async fn start(self) -> Result<WatchHandle, ServerError> {
        let pipeline = Arc::clone(&self.pipeline);
        match tokio::task::spawn_blocking(move || pipeline.run(Target::Build)).await {
            Ok(Ok(summary)) => tracing::info!(
                "Initial build wrote {} files in {}ms",
                summary.files_written(),
                summary.duration_ms
            ),
            Ok(Err(e)) => tracing::error!("Initial build failed: {}", e),
            Err(e) => return Err(ServerError::TaskError(e.to_string())),
        }

        let addr = parse_addr(&self.config.server.host, self.config.server.livereload_port)?;
        let livereload = LiveReloadServer::new(self.hub.clone(), addr).start().await?;

        // notify reports absolute paths
        let root = self
            .config
            .root
            .canonicalize()
            .map_err(|e| ServerError::WatchError(format!("{}: {}", self.config.root.display(), e)))?;
        let subscriptions = default_subscriptions(&self.config)?;
        let (watcher, mut events) = FileWatcher::new(&self.watch_dirs(&root))
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let dispatcher = Dispatcher::new(self.pipeline.clone(), self.policy);
        tracing::info!("Watching for changes (overlap policy: {})", self.policy);

        let event_loop = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Ok(relative) = event.path().strip_prefix(&root) else {
                    continue;
                };

                for task in tasks_for(&subscriptions, relative) {
                    tracing::info!("{} changed, running '{}'", relative.display(), task);
                    dispatcher.dispatch(task);
                }
            }
            dispatcher.shutdown().await;
        });

        Ok(WatchHandle {
            watcher: Some(watcher),
            event_loop,
            livereload,
            hub: self.hub,
        })
    }

    /// Source directories to watch, deduplicated.
    fn watch_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in [
            &self.config.views.src,
            &self.config.layouts.src,
            &self.config.stylesheets.src,
            &self.config.javascripts.src,
            &self.config.images.src,
            &self.config.fonts.src,
        ] {
            let dir = root.join(dir);
            // Nested directories are covered by the recursive parent watch.
            if !dirs.iter().any(|d| dir.starts_with(d)) {
                dirs.retain(|d| !d.starts_with(&dir));
                dirs.push(dir);
            }
        }
        dirs
    }
}

/// Owns everything the watch loop started.
pub struct WatchHandle {
    watcher: Option<FileWatcher>,
    event_loop: JoinHandle<()>,
    livereload: ServerHandle,
    hub: LiveReloadHub,
}

impl WatchHandle {
    pub fn hub(&self) -> &LiveReloadHub {
        &self.hub
    }

    pub fn livereload_addr(&self) -> Option<std::net::SocketAddr> {
        self.livereload.local_addr()
    }

    /// Stop watching, let scheduled runs finish, then stop live reload.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        drop(self.watcher.take());
        self.event_loop
            .await
            .map_err(|e| ServerError::TaskError(e.to_string()))?;
        self.livereload.shutdown().await
    }
}
