//! Bootstrap error types and their classification.
//!
//! Every error is either recoverable (logged at the launch boundary, the
//! process stays up or exits with status 1) or fatal (always propagated).

use crate::runner::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Recoverable,
    Fatal,
}

#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to initialize runner '{runner}': {reason}")]
    Initialization { runner: String, reason: String },

    #[error("Bootstrap: command \"{0}\" does not exist")]
    UnknownCommand(String),

    #[error("Runner '{runner}' failed: {source}")]
    DelegateInvocation {
        runner: String,
        #[source]
        source: RunnerError,
    },

    #[error("Runner '{runner}' panicked: {message}")]
    DelegatePanicked { runner: String, message: String },

    #[error("Worker pool is shut down, task rejected")]
    Rejected,

    #[error("Failed to start worker pool: {0}")]
    PoolStartup(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Bootstrap lock poisoned")]
    Poisoned,
}

impl BootstrapError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::DelegatePanicked { .. } | Self::Poisoned => Severity::Fatal,
            Self::Initialization { .. }
            | Self::UnknownCommand(_)
            | Self::DelegateInvocation { .. }
            | Self::Rejected
            | Self::PoolStartup(_)
            | Self::Config(_) => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Machine readable error code, used as a structured log field.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Initialization { .. } => "INITIALIZATION",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::DelegateInvocation { .. } => "DELEGATE_INVOCATION",
            Self::DelegatePanicked { .. } => "DELEGATE_PANICKED",
            Self::Rejected => "REJECTED",
            Self::PoolStartup(_) => "POOL_STARTUP",
            Self::Config(_) => "CONFIG",
            Self::Poisoned => "POISONED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BootstrapError::Poisoned.is_fatal());
        assert!(BootstrapError::DelegatePanicked {
            runner: "r".into(),
            message: "boom".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_recoverable_classification() {
        let errors = vec![
            BootstrapError::Initialization {
                runner: "r".into(),
                reason: "missing".into(),
            },
            BootstrapError::UnknownCommand("pause".into()),
            BootstrapError::DelegateInvocation {
                runner: "r".into(),
                source: RunnerError::Other(anyhow::anyhow!("bad")),
            },
            BootstrapError::Rejected,
            BootstrapError::Config("oops".into()),
        ];
        for e in errors {
            assert_eq!(e.severity(), Severity::Recoverable, "{} should be recoverable", e);
        }
    }

    #[test]
    fn test_unknown_command_message() {
        let e = BootstrapError::UnknownCommand("pause".into());
        assert_eq!(e.to_string(), "Bootstrap: command \"pause\" does not exist");
        assert_eq!(e.error_code(), "UNKNOWN_COMMAND");
    }
}
