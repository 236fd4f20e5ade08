//! Runs the built `mockrun` binary against a shell-script runner and checks
//! the process exit status.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// A home directory whose default runner program is `script`.
fn home_with_runner(script: &str) -> tempfile::TempDir {
    let home = tempfile::tempdir().unwrap();
    let bin = home.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    let program = bin.join("mockservicerunner.sh");
    std::fs::write(&program, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    home
}

fn spawn(home: &Path, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_mockrun"))
        .args(args)
        .env("MOCKRUN_HOME", home)
        .env("MOCKRUN_CONFIG", home.join("no-such-bootstrap.toml"))
        .env("RUST_LOG", "warn")
        .spawn()
        .unwrap()
}

fn wait(mut child: Child, limit: Duration) -> ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("mockrun did not exit within {:?}", limit);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_runner_exit_code_becomes_process_status() {
    let home = home_with_runner("exit 3");
    let status = wait(spawn(home.path(), &["start"]), Duration::from_secs(30));
    assert_eq!(status.code(), Some(3));
}

#[test]
fn test_runner_success_exits_zero() {
    let home = home_with_runner("exit 0");
    let status = wait(spawn(home.path(), &["start", "-m", "orders"]), Duration::from_secs(30));
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_unknown_command_exits_zero_without_running() {
    let home = home_with_runner("exit 9");
    let status = wait(spawn(home.path(), &["project.xml"]), Duration::from_secs(30));
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_sigterm_cancels_runner_and_exits_zero() {
    let home = home_with_runner("exec sleep 30");
    let child = spawn(home.path(), &["start"]);
    // give the binary time to install its signal handlers
    std::thread::sleep(Duration::from_secs(1));
    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).unwrap();

    let status = wait(child, Duration::from_secs(20));
    assert_eq!(status.code(), Some(0));
}
