//! Home directory resolution and the bootstrap configuration file.
//!
//! The home directory is resolved once per process from `MOCKRUN_HOME`
//! (falling back to the current directory) and written back to the same
//! variable, so the runner process and any other code see one consistent
//! value.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

use crate::bootstrap::error::BootstrapError;

/// Environment variable holding the home directory.
pub const HOME_VAR: &str = "MOCKRUN_HOME";

/// Environment variable overriding the configuration file location.
pub const CONFIG_VAR: &str = "MOCKRUN_CONFIG";

static PROCESS_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Resolve a home directory from an optional setting.
///
/// A relative setting is taken relative to `cwd`. A setting that
/// canonicalizes wins. Anything else (absent, empty, pointing nowhere)
/// falls back to the canonical form of `cwd`.
pub fn resolve_home(setting: Option<&str>, cwd: &Path) -> PathBuf {
    if let Some(home) = setting.map(str::trim).filter(|s| !s.is_empty()) {
        match cwd.join(home).canonicalize() {
            Ok(path) => return path,
            Err(e) => {
                tracing::warn!("{} '{}' is not usable ({}), falling back to current directory", HOME_VAR, home, e);
            }
        }
    }

    cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf())
}

/// The process-wide home directory, resolved on first use and published
/// back into `MOCKRUN_HOME`.
pub fn process_home() -> &'static Path {
    PROCESS_HOME.get_or_init(|| {
        let setting = std::env::var(HOME_VAR).ok();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let home = resolve_home(setting.as_deref(), &cwd);
        std::env::set_var(HOME_VAR, &home);
        tracing::debug!("Process home resolved to {}", home.display());
        home
    })
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub runner: RunnerConfig,
    pub pool: PoolConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Registry key of the delegate runner.
    pub name: String,
    /// Runner program, relative to the home directory unless absolute.
    pub program: String,
    /// Arguments placed before the launch arguments.
    pub args: Vec<String>,
    pub working_dir: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: crate::runner::DEFAULT_RUNNER.to_string(),
            program: default_program().to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

#[cfg(target_os = "windows")]
fn default_program() -> &'static str {
    "bin/mockservicerunner.bat"
}

#[cfg(not(target_os = "windows"))]
fn default_program() -> &'static str {
    "bin/mockservicerunner.sh"
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub threads: usize,
    pub shutdown_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            shutdown_timeout_secs: 10,
        }
    }
}

impl BootstrapConfig {
    /// Load the configuration for `home`.
    ///
    /// `MOCKRUN_CONFIG` takes precedence over `<home>/config/bootstrap.toml`.
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(home: &Path) -> Result<Self, BootstrapError> {
        let path = std::env::var(CONFIG_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("config").join("bootstrap.toml"));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, BootstrapError> {
        let content = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(BootstrapError::Config(format!("failed to read {}: {}", path.display(), e)));
            }
        };
        Self::parse(&content).map_err(|e| match e {
            BootstrapError::Config(msg) => BootstrapError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, BootstrapError> {
        let mut cfg: Self = toml::from_str(content).map_err(|e| BootstrapError::Config(e.to_string()))?;
        if cfg.pool.threads == 0 {
            tracing::warn!("pool.threads = 0 is not usable, using 1");
            cfg.pool.threads = 1;
        }
        Ok(cfg)
    }
}

impl RunnerConfig {
    /// Program path resolved against `home`.
    pub fn program_path(&self, home: &Path) -> PathBuf {
        resolve_against(home, &self.program)
    }

    /// Working directory for the runner, defaulting to `home`.
    pub fn working_dir(&self, home: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) => resolve_against(home, dir),
            None => home.to_path_buf(),
        }
    }
}

fn resolve_against(home: &Path, value: &str) -> PathBuf {
    let p = Path::new(value);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        home.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_home_uses_setting() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = std::env::current_dir().unwrap();
        let home = resolve_home(dir.path().to_str(), &cwd);
        assert_eq!(home, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_home_canonicalizes_dot_segments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let setting = dir.path().join("sub").join("..");
        let cwd = std::env::current_dir().unwrap();
        let home = resolve_home(setting.to_str(), &cwd);
        assert_eq!(home, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_home_relative_to_cwd() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(cwd.path().join("soapui")).unwrap();
        let home = resolve_home(Some("soapui"), cwd.path());
        assert_eq!(home, cwd.path().join("soapui").canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_home_falls_back_to_cwd() {
        let cwd = tempfile::tempdir().unwrap();
        let expected = cwd.path().canonicalize().unwrap();

        assert_eq!(resolve_home(None, cwd.path()), expected);
        assert_eq!(resolve_home(Some(""), cwd.path()), expected);
        assert_eq!(resolve_home(Some("/definitely/not/here/mockrun"), cwd.path()), expected);
    }

    #[test]
    fn test_process_home_is_published() {
        let home = process_home();
        assert!(!home.as_os_str().is_empty());
        assert_eq!(std::env::var(HOME_VAR).unwrap(), home.to_string_lossy());
        // second call returns the same value
        assert_eq!(process_home(), home);
    }

    #[test]
    fn test_config_defaults() {
        let cfg = BootstrapConfig::parse("").unwrap();
        assert_eq!(cfg.runner.name, crate::runner::DEFAULT_RUNNER);
        assert_eq!(cfg.pool.threads, 2);
        assert_eq!(cfg.pool.shutdown_timeout_secs, 10);
        assert!(cfg.runner.args.is_empty());
    }

    #[test]
    fn test_config_parse() {
        let cfg = BootstrapConfig::parse(
            r#"
            [runner]
            name = "custom"
            program = "/opt/soap/bin/runner"
            args = ["-m", "orders"]
            working_dir = "work"

            [pool]
            threads = 4
            "#,
        )
        .unwrap();

        assert_eq!(cfg.runner.name, "custom");
        assert_eq!(cfg.runner.args, vec!["-m", "orders"]);
        assert_eq!(cfg.pool.threads, 4);
        assert_eq!(cfg.pool.shutdown_timeout_secs, 10);

        let home = Path::new("/srv/mockrun");
        assert_eq!(cfg.runner.program_path(home), PathBuf::from("/opt/soap/bin/runner"));
        assert_eq!(cfg.runner.working_dir(home), home.join("work"));
    }

    #[test]
    fn test_config_zero_threads_clamped() {
        let cfg = BootstrapConfig::parse("[pool]\nthreads = 0\n").unwrap();
        assert_eq!(cfg.pool.threads, 1);
    }

    #[test]
    fn test_config_malformed_is_error() {
        let result = BootstrapConfig::parse("[pool]\nthreads = \"many\"\n");
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BootstrapConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, BootstrapConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bootstrap.toml");
        std::fs::write(&path, "[pool]\nthreads = 3\n").unwrap();
        let cfg = BootstrapConfig::load_from(&path).unwrap();
        assert_eq!(cfg.pool.threads, 3);
    }

    #[test]
    fn test_working_dir_defaults_to_home() {
        let cfg = RunnerConfig::default();
        let home = Path::new("/srv/mockrun");
        assert_eq!(cfg.working_dir(home), home);
        assert_eq!(cfg.program_path(home), home.join(default_program()));
    }
}
