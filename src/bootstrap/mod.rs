//! Lifecycle manager for the delegate runner:
//! init → load → start → stop → destroy.

pub mod delegate;
pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::pool::{ReportStream, WorkerPool};
use crate::runner::RunnerRegistry;
use delegate::DelegateTask;
use error::BootstrapError;

pub struct Bootstrap {
    config: BootstrapConfig,
    home: PathBuf,
    registry: RunnerRegistry,
    pool: WorkerPool,
    delegate: Option<DelegateTask>,
    args: Vec<String>,
    inits: usize,
}

impl Bootstrap {
    pub fn new(config: BootstrapConfig, home: &Path, registry: RunnerRegistry) -> Result<Self, BootstrapError> {
        let pool = WorkerPool::new(config.pool.threads)?;
        Ok(Self {
            config,
            home: home.to_path_buf(),
            registry,
            pool,
            delegate: None,
            args: Vec::new(),
            inits: 0,
        })
    }

    /// Resolve the configured runner into a fresh delegate task.
    ///
    /// Calling this again re-resolves the runner and replaces the kept
    /// delegate. Tasks already submitted keep their runner.
    pub fn init(&mut self) -> Result<(), BootstrapError> {
        tracing::debug!("Loading runner '{}'", self.config.runner.name);
        let task = DelegateTask::resolve(&self.registry, &self.config.runner.name)?;
        tracing::info!("Runner '{}' initialized (task {})", task.runner_name(), task.id());
        self.delegate = Some(task);
        self.inits += 1;
        Ok(())
    }

    /// Record the arguments handed to the runner on the next `start()`.
    pub fn load(&mut self, arguments: Vec<String>) {
        self.args = arguments;
    }

    pub fn init_with_args(&mut self, arguments: Vec<String>) -> Result<(), BootstrapError> {
        self.init()?;
        self.load(arguments);
        Ok(())
    }

    /// Submit the delegate to the worker pool and return without waiting.
    ///
    /// Initializes only if no delegate was ever resolved; later starts submit
    /// a fresh task for the same runner. The arguments are copied into the
    /// task here, so a later `load()` does not affect it.
    pub fn start(&mut self) -> Result<Uuid, BootstrapError> {
        if self.delegate.is_none() {
            self.init()?;
        }
        let task = self
            .delegate
            .as_ref()
            .map(DelegateTask::resubmit)
            .ok_or_else(|| BootstrapError::Initialization {
                runner: self.config.runner.name.clone(),
                reason: "no delegate task after init".to_string(),
            })?;

        let id = self.pool.submit(task, self.args.clone(), self.home.clone())?;
        tracing::info!("Submitted task {} with {} argument(s)", id, self.args.len());
        Ok(id)
    }

    /// Graceful shutdown: no new tasks, the running one may finish.
    pub fn stop(&mut self) {
        self.pool.shutdown();
    }

    /// Forceful shutdown: cancel the running task.
    pub fn destroy(&mut self) {
        self.pool.shutdown_now();
    }

    /// Block until the pool has terminated or `pool.shutdown_timeout_secs`
    /// has passed.
    pub fn await_termination(&mut self) -> bool {
        let timeout = Duration::from_secs(self.config.pool.shutdown_timeout_secs);
        self.pool.await_termination(timeout)
    }

    pub fn take_reports(&mut self) -> Option<ReportStream> {
        self.pool.take_reports()
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    /// Number of successful `init()` calls.
    pub fn init_count(&self) -> usize {
        self.inits
    }

    /// Number of tasks submitted to the pool.
    pub fn submitted(&self) -> usize {
        self.pool.submitted()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
