//! The delegate contract: a named service runner with a command-line entry
//! point, and the registry the bootstrap resolves it from.

pub mod process;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bootstrap::error::BootstrapError;
use crate::config::BootstrapConfig;

/// Registry key of the built-in mock service runner.
pub const DEFAULT_RUNNER: &str = "mock-service-runner";

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    /// The run was interrupted through its cancellation token.
    #[error("runner was cancelled")]
    Cancelled,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Everything a runner gets to see for one run. Built when the task is
/// submitted and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub args: Vec<String>,
    pub home: PathBuf,
    pub cancel: CancellationToken,
}

impl LaunchContext {
    pub fn new(args: Vec<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            args,
            home: home.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A service runner with a blocking command-line entry point.
///
/// `run_from_command_line` may block for as long as the service runs. It
/// should watch `ctx.cancel` and return [`RunnerError::Cancelled`] once it
/// fires.
pub trait ServiceRunner: Send + Sync {
    fn name(&self) -> &str;

    fn run_from_command_line(&self, ctx: &LaunchContext) -> Result<i32, RunnerError>;
}

pub type RunnerFactory = Box<dyn Fn() -> Result<Arc<dyn ServiceRunner>, RunnerError> + Send + Sync>;

/// Named runner factories.
#[derive(Default)]
pub struct RunnerRegistry {
    factories: BTreeMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in process runner under the configured name.
    pub fn with_defaults(config: &BootstrapConfig, home: &Path) -> Self {
        let mut registry = Self::new();
        let runner_cfg = config.runner.clone();
        let home = home.to_path_buf();
        let name = runner_cfg.name.clone();
        registry.register(&name, move || {
            let runner = process::ProcessRunner::from_config(&runner_cfg, &home)?;
            Ok(Arc::new(runner) as Arc<dyn ServiceRunner>)
        });
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ServiceRunner>, RunnerError> + Send + Sync + 'static,
    {
        if self.factories.insert(name.to_string(), Box::new(factory)).is_some() {
            tracing::debug!("Runner '{}' re-registered", name);
        }
    }

    /// Instantiate the runner registered as `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ServiceRunner>, BootstrapError> {
        let factory = self.factories.get(name).ok_or_else(|| BootstrapError::Initialization {
            runner: name.to_string(),
            reason: "no runner registered under this name".to_string(),
        })?;
        factory().map_err(|e| BootstrapError::Initialization {
            runner: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
