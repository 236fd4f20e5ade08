//! Fixed-size worker pool running delegate tasks off the controlling thread.
//!
//! The pool owns a dedicated multi-threaded tokio runtime. Runners block,
//! so each task runs on the runtime's blocking threads, capped at the pool
//! size. Finished tasks are reported on an unbounded channel; nothing is
//! returned to the submitter.
//!
//! Methods that wait (`await_termination`, `ReportStream::next_timeout`)
//! block the calling thread and must not be called from inside a tokio
//! runtime.

pub mod state;

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bootstrap::delegate::{DelegateTask, TaskOutcome, TaskReport};
use crate::bootstrap::error::BootstrapError;
use crate::runner::LaunchContext;
use state::{PoolState, StateMachine};

pub struct WorkerPool {
    runtime: Option<Runtime>,
    threads: usize,
    state: StateMachine,
    cancel: CancellationToken,
    inflight: Vec<JoinHandle<()>>,
    submitted: usize,
    report_tx: mpsc::UnboundedSender<TaskReport>,
    report_rx: Option<mpsc::UnboundedReceiver<TaskReport>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, BootstrapError> {
        let threads = threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(threads)
            .thread_name("mockrun-worker")
            .enable_all()
            .build()
            .map_err(BootstrapError::PoolStartup)?;
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        tracing::debug!("Worker pool started with {} threads", threads);
        Ok(Self {
            runtime: Some(runtime),
            threads,
            state: StateMachine::new(),
            cancel: CancellationToken::new(),
            inflight: Vec::new(),
            submitted: 0,
            report_tx,
            report_rx: Some(report_rx),
        })
    }

    /// Queue `task` for execution with a snapshot of its launch arguments.
    pub fn submit(&mut self, task: DelegateTask, args: Vec<String>, home: PathBuf) -> Result<Uuid, BootstrapError> {
        self.refresh();
        let runtime = match (&self.runtime, self.state.is_accepting()) {
            (Some(rt), true) => rt,
            _ => return Err(BootstrapError::Rejected),
        };

        let id = task.id();
        let ctx = LaunchContext::new(args, home).with_cancel(self.cancel.child_token());
        let report_tx = self.report_tx.clone();

        let handle = runtime.spawn(async move {
            let runner = task.runner_name().to_string();
            let outcome = match tokio::task::spawn_blocking(move || task.run(&ctx)).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => TaskOutcome::Panicked(panic_message(e.into_panic())),
                Err(_) => TaskOutcome::Cancelled,
            };
            log_outcome(id, &runner, &outcome);
            // the receiver may be gone; the outcome is logged either way
            let _ = report_tx.send(TaskReport { id, runner, outcome });
        });

        self.inflight.push(handle);
        self.submitted += 1;
        Ok(id)
    }

    /// Stop accepting tasks; running ones are left to finish.
    pub fn shutdown(&mut self) {
        self.refresh();
        if self.state.is_accepting() {
            let _ = self.state.transition(PoolState::Shutdown);
            tracing::info!("Worker pool shutting down, {} task(s) still running", self.inflight.len());
        }
        self.refresh();
    }

    /// Stop accepting tasks and cancel the running ones.
    pub fn shutdown_now(&mut self) {
        if self.state.is_accepting() {
            let _ = self.state.transition(PoolState::Shutdown);
        }
        if !self.cancel.is_cancelled() {
            tracing::info!("Cancelling {} running task(s)", self.active());
            self.cancel.cancel();
        }
        self.refresh();
    }

    /// Wait up to `timeout` for every submitted task to finish. Returns
    /// whether the pool is terminated.
    pub fn await_termination(&mut self, timeout: Duration) -> bool {
        let mut handles = std::mem::take(&mut self.inflight);
        if let Some(rt) = &self.runtime {
            rt.block_on(async {
                let _ = tokio::time::timeout(timeout, async {
                    for handle in handles.iter_mut() {
                        let _ = handle.await;
                    }
                })
                .await;
            });
        }
        handles.retain(|h| !h.is_finished());
        self.inflight = handles;
        self.refresh();
        self.is_terminated()
    }

    /// Hand out the report stream. Only the first call gets it.
    pub fn take_reports(&mut self) -> Option<ReportStream> {
        let rx = self.report_rx.take()?;
        let handle = self.runtime.as_ref()?.handle().clone();
        Some(ReportStream { rx, handle })
    }

    pub fn state(&self) -> PoolState {
        self.state.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state.state == PoolState::Terminated
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Number of tasks ever accepted.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Number of tasks that have not finished yet.
    pub fn active(&self) -> usize {
        self.inflight.iter().filter(|h| !h.is_finished()).count()
    }

    fn refresh(&mut self) {
        self.inflight.retain(|h| !h.is_finished());
        if self.state.state == PoolState::Shutdown && self.inflight.is_empty() {
            let _ = self.state.transition(PoolState::Terminated);
            tracing::debug!("Worker pool terminated");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            // safe from inside another runtime, unlike dropping it
            rt.shutdown_background();
        }
    }
}

/// Receiving end of the task reports.
pub struct ReportStream {
    rx: mpsc::UnboundedReceiver<TaskReport>,
    handle: Handle,
}

impl ReportStream {
    pub async fn recv(&mut self) -> Option<TaskReport> {
        self.rx.recv().await
    }

    /// Runtime handle of the pool, for blocking on the stream from
    /// a plain thread.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Block until a report arrives or `timeout` elapses.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<TaskReport> {
        let handle = self.handle.clone();
        handle.block_on(async { tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten() })
    }
}

fn log_outcome(id: Uuid, runner: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Completed(0) => tracing::info!("Task {} ('{}') completed", id, runner),
        TaskOutcome::Completed(code) => {
            tracing::warn!("Task {} ('{}') exited with code {}", id, runner, code)
        }
        TaskOutcome::Cancelled => tracing::info!("Task {} ('{}') cancelled", id, runner),
        TaskOutcome::Failed(e) => {
            tracing::error!(error_code = e.error_code(), "Task {} failed: {}", id, e)
        }
        TaskOutcome::Panicked(msg) => {
            tracing::error!("Task {} ('{}') panicked: {}", id, runner, msg)
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
