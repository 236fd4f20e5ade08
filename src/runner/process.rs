//! Built-in runner that launches the external mock service runner program
//! as a child process and waits for it.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;

use super::{LaunchContext, RunnerError, ServiceRunner};
use crate::config::{RunnerConfig, HOME_VAR};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

pub struct ProcessRunner {
    name: String,
    program: PathBuf,
    prefix_args: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(name: &str, program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            prefix_args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    /// Build the runner described by `cfg`. Fails when the program is not
    /// there, so a missing installation is caught during `init()`.
    pub fn from_config(cfg: &RunnerConfig, home: &Path) -> Result<Self, RunnerError> {
        let program = cfg.program_path(home);
        if !program.is_file() {
            return Err(RunnerError::Other(anyhow::anyhow!(
                "runner program {} not found",
                program.display()
            )));
        }
        Ok(Self::new(&cfg.name, program, cfg.working_dir(home)).with_args(cfg.args.clone()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, ctx: &LaunchContext) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(&ctx.args)
            .current_dir(&self.working_dir)
            .env(HOME_VAR, &ctx.home)
            .stdin(Stdio::null());
        apply_creation_flags(&mut cmd);
        cmd
    }

    /// Wait for the child, stopping it if the run gets cancelled.
    fn supervise(&self, child: &mut Child, ctx: &LaunchContext) -> Result<i32, RunnerError> {
        loop {
            if let Some(status) = child.try_wait().context("failed to poll runner process")? {
                tracing::info!("Runner '{}' (pid {}) exited with {}", self.name, child.id(), status);
                return Ok(exit_code(status));
            }
            if ctx.is_cancelled() {
                tracing::info!("Runner '{}' cancelled, stopping pid {}", self.name, child.id());
                terminate(child, TERMINATE_GRACE);
                return Err(RunnerError::Cancelled);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ServiceRunner for ProcessRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_from_command_line(&self, ctx: &LaunchContext) -> Result<i32, RunnerError> {
        if ctx.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        tracing::info!(
            "Launching {} {:?} in {}",
            self.program.display(),
            self.prefix_args.iter().chain(ctx.args.iter()).collect::<Vec<_>>(),
            self.working_dir.display()
        );

        let mut child = self.command(ctx).spawn().map_err(|source| RunnerError::Launch {
            program: self.program.display().to_string(),
            source,
        })?;

        self.supervise(&mut child, ctx)
    }
}

/// Ask the child to stop, then kill it if it is still around after `grace`.
fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Err(e) = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
            tracing::warn!("Failed to send SIGTERM to pid {}: {}", child.id(), e);
        } else {
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => std::thread::sleep(POLL_INTERVAL),
                    Err(_) => break,
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill() {
        tracing::warn!("Failed to kill pid {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Hide the console window of the runner on Windows.
#[cfg(target_os = "windows")]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}
