//! The delegate task: one resolved runner plus the outcome of running it.

use std::sync::Arc;

use uuid::Uuid;

use super::error::BootstrapError;
use crate::runner::{LaunchContext, RunnerError, RunnerRegistry, ServiceRunner};

/// Exit status used by the runtime for a panic.
pub const PANIC_EXIT_CODE: i32 = 101;

pub struct DelegateTask {
    id: Uuid,
    runner_name: String,
    runner: Arc<dyn ServiceRunner>,
}

impl DelegateTask {
    /// Resolve and instantiate the runner registered as `name`.
    pub fn resolve(registry: &RunnerRegistry, name: &str) -> Result<Self, BootstrapError> {
        let runner = registry.resolve(name)?;
        Ok(Self::new(name, runner))
    }

    pub fn new(name: &str, runner: Arc<dyn ServiceRunner>) -> Self {
        Self {
            id: Uuid::new_v4(),
            runner_name: name.to_string(),
            runner,
        }
    }

    /// Another task for the same runner instance, with its own id.
    pub fn resubmit(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            runner_name: self.runner_name.clone(),
            runner: self.runner.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn runner_name(&self) -> &str {
        &self.runner_name
    }

    /// Invoke the runner's entry point. Blocks for as long as the runner runs.
    pub fn run(&self, ctx: &LaunchContext) -> TaskOutcome {
        tracing::debug!("Task {} invoking '{}' with {:?}", self.id, self.runner_name, ctx.args);
        match self.runner.run_from_command_line(ctx) {
            Ok(code) => TaskOutcome::Completed(code),
            Err(RunnerError::Cancelled) => TaskOutcome::Cancelled,
            Err(source) => TaskOutcome::Failed(BootstrapError::DelegateInvocation {
                runner: self.runner_name.clone(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for DelegateTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateTask")
            .field("id", &self.id)
            .field("runner", &self.runner_name)
            .finish()
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    /// The entry point returned this code.
    Completed(i32),
    /// The run was interrupted. Not a failure.
    Cancelled,
    Failed(BootstrapError),
    Panicked(String),
}

impl TaskOutcome {
    /// The runner's code, or -1 when the entry point did not return one.
    pub fn result_code(&self) -> i32 {
        match self {
            Self::Completed(code) => *code,
            _ => -1,
        }
    }

    pub fn exit_intent(&self) -> ExitIntent {
        match self {
            Self::Completed(0) | Self::Cancelled | Self::Failed(_) => ExitIntent::Continue,
            Self::Completed(code) => ExitIntent::Terminate(*code),
            Self::Panicked(_) => ExitIntent::Terminate(PANIC_EXIT_CODE),
        }
    }
}

/// What the process should do once a task has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitIntent {
    Continue,
    /// Exit right away with this status.
    Terminate(i32),
}

/// Sent by the worker pool whenever a task finishes.
#[derive(Debug)]
pub struct TaskReport {
    pub id: Uuid,
    pub runner: String,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    pub fn exit_intent(&self) -> ExitIntent {
        self.outcome.exit_intent()
    }
}
