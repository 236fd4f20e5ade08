//! The process-wide daemon slot and command dispatch.
//!
//! `launch` is the one place where the error policy is applied: recoverable
//! errors are logged and turned into a [`LaunchOutcome`], fatal ones are
//! returned to the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::bootstrap::error::BootstrapError;
use crate::bootstrap::Bootstrap;

pub type SharedBootstrap = Arc<Mutex<Bootstrap>>;

static DAEMON: DaemonSlot = DaemonSlot::new();

const USAGE: &str = "Must provide some arguments to run the mock service runner. \
Usage: mockrun [start|stop] [runner args...]; use `start` explicitly when the first runner argument is not an option";

/// The slot used by the `mockrun` binary.
pub fn global() -> &'static DaemonSlot {
    &DAEMON
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Unknown(String),
}

impl Command {
    /// Split the command line into a command and the runner arguments.
    ///
    /// No arguments, or a leading option, means an implicit `start` with
    /// everything passed through to the runner. A positional first runner
    /// argument (a project file, say) needs an explicit `start` in front of
    /// it, otherwise it is read as the command.
    pub fn parse(args: &[String]) -> (Command, Vec<String>) {
        let Some(first) = args.first() else {
            return (Command::Start, Vec::new());
        };
        if first.starts_with('-') {
            return (Command::Start, args.to_vec());
        }

        let rest = args[1..].to_vec();
        let command = match first.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            other => Command::Unknown(other.to_string()),
        };
        (command, rest)
    }
}

#[derive(Debug)]
pub enum LaunchOutcome {
    /// The delegate was submitted.
    Started(Uuid),
    Stopped,
    /// Unrecognized command, nothing done.
    Ignored,
    /// Startup failed; no daemon was published.
    Abandoned(BootstrapError),
    /// Dispatch failed with a recoverable error.
    Failed(BootstrapError),
}

/// Holder of the singleton bootstrap.
pub struct DaemonSlot {
    inner: Mutex<Option<SharedBootstrap>>,
}

impl Default for DaemonSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonSlot {
    pub const fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<SharedBootstrap>>, BootstrapError> {
        self.inner.lock().map_err(|e| {
            tracing::error!("Daemon slot lock poisoned: {}", e);
            BootstrapError::Poisoned
        })
    }

    pub fn get(&self) -> Result<Option<SharedBootstrap>, BootstrapError> {
        Ok(self.lock()?.clone())
    }

    /// Publish `bootstrap` unless a daemon already exists, and return the
    /// daemon that ends up in the slot.
    pub fn promote(&self, bootstrap: Bootstrap) -> Result<SharedBootstrap, BootstrapError> {
        let mut slot = self.lock()?;
        match slot.as_ref() {
            Some(existing) => {
                tracing::debug!("Daemon already published, keeping existing instance");
                Ok(existing.clone())
            }
            None => {
                let daemon = Arc::new(Mutex::new(bootstrap));
                *slot = Some(daemon.clone());
                Ok(daemon)
            }
        }
    }

    /// Entry point: initialize the daemon on first use, then dispatch the
    /// command found in `args`.
    pub fn launch<F>(&self, args: &[String], create: F) -> Result<LaunchOutcome, BootstrapError>
    where
        F: FnOnce() -> Result<Bootstrap, BootstrapError>,
    {
        let daemon = match self.get()? {
            Some(existing) => {
                tracing::debug!("Reusing initialized daemon");
                existing
            }
            None => {
                // only published once init() has succeeded
                let initialized = create().and_then(|mut bootstrap| {
                    bootstrap.init()?;
                    Ok(bootstrap)
                });
                match initialized {
                    Ok(bootstrap) => self.promote(bootstrap)?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(error_code = e.error_code(), "Startup failed: {}", e);
                        return Ok(LaunchOutcome::Abandoned(e));
                    }
                }
            }
        };

        if args.is_empty() {
            tracing::warn!("{}", USAGE);
        }
        let (command, rest) = Command::parse(args);
        match dispatch(&daemon, command, rest) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!(error_code = e.error_code(), "Launch failed: {}", e);
                Ok(LaunchOutcome::Failed(e))
            }
        }
    }
}

fn dispatch(daemon: &SharedBootstrap, command: Command, rest: Vec<String>) -> Result<LaunchOutcome, BootstrapError> {
    let mut bootstrap = daemon.lock().map_err(|_| BootstrapError::Poisoned)?;
    match command {
        Command::Start => {
            bootstrap.load(rest);
            let id = bootstrap.start()?;
            Ok(LaunchOutcome::Started(id))
        }
        Command::Stop => {
            bootstrap.stop();
            Ok(LaunchOutcome::Stopped)
        }
        Command::Unknown(name) => {
            tracing::warn!("{}", BootstrapError::UnknownCommand(name));
            tracing::warn!("{}", USAGE);
            Ok(LaunchOutcome::Ignored)
        }
    }
}
