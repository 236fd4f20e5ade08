use mockrun::bootstrap::delegate::ExitIntent;
use mockrun::bootstrap::Bootstrap;
use mockrun::config::{self, BootstrapConfig};
use mockrun::daemon::{self, LaunchOutcome, SharedBootstrap};
use mockrun::logging;
use mockrun::runner::RunnerRegistry;

fn main() -> anyhow::Result<()> {
    logging::init();

    let home = config::process_home();
    tracing::info!("Bootstrap starting, home {}", home.display());
    let cfg = BootstrapConfig::load(home)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let slot = daemon::global();
    let outcome = slot.launch(&args, || {
        let registry = RunnerRegistry::with_defaults(&cfg, home);
        Bootstrap::new(cfg.clone(), home, registry)
    })?;

    match outcome {
        LaunchOutcome::Started(_) => {
            if let Some(daemon) = slot.get()? {
                supervise(&daemon)?;
            }
        }
        LaunchOutcome::Failed(_) => std::process::exit(1),
        LaunchOutcome::Stopped | LaunchOutcome::Ignored | LaunchOutcome::Abandoned(_) => {}
    }

    tracing::info!("Bootstrap exiting");
    Ok(())
}

/// Wait for the delegate to finish (or a shutdown signal) and apply its
/// exit intent.
fn supervise(daemon: &SharedBootstrap) -> anyhow::Result<()> {
    let reports = daemon
        .lock()
        .map_err(|_| anyhow::anyhow!("bootstrap lock poisoned"))?
        .take_reports();
    let Some(mut reports) = reports else {
        return Ok(());
    };

    let handle = reports.handle();
    let report = handle.block_on(async {
        tokio::select! {
            report = reports.recv() => report,
            _ = shutdown_signal() => None,
        }
    });

    let mut bootstrap = daemon.lock().map_err(|_| anyhow::anyhow!("bootstrap lock poisoned"))?;
    match report.as_ref().map(|r| r.exit_intent()) {
        Some(ExitIntent::Terminate(code)) => {
            tracing::warn!("Runner requested exit with status {}", code);
            std::process::exit(code);
        }
        Some(ExitIntent::Continue) => bootstrap.stop(),
        None => {
            tracing::info!("Shutdown signal received, cancelling runner");
            bootstrap.destroy();
        }
    }

    if !bootstrap.await_termination() {
        tracing::warn!("Worker pool did not terminate in time");
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            tracing::warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
