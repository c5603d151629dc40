//! # targetsync - daemon entry point
//!
//! ## Startup Sequence
//!
//! 1. **Tracing** - install the subscriber at `--log-level` (or `RUST_LOG`)
//! 2. **Settings** - load and validate the settings file
//! 3. **Readiness probe** - serve `/ready` when `--bind-address` is given
//! 4. **Backends** - build the locker, source and destination
//! 5. **Leader runner** - contend for the lock and sync while elected
//!
//! ## Shutdown
//!
//! SIGTERM/SIGINT cancel the root scope. A run that ends because of that
//! cancellation exits 0; any other error exits non-zero.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use targetsync::backends;
use targetsync::cli::{Cli, LogLevel};
use targetsync::settings::Settings;
use targetsync::shutdown::install_signal_handlers;
use targetsync_reconciler::LeaderRunner;
use targetsync_web::Readiness;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    info!(
        remove_delay = ?settings.sync.remove_delay,
        lock_key = %settings.sync.lock.key,
        "targetsync starting"
    );

    let scope = CancellationToken::new();
    let signals = install_signal_handlers(scope.clone());

    let readiness = Readiness::new();
    let probe = cli.bind_address.map(|addr| {
        tokio::spawn(targetsync_web::serve(addr, readiness.clone(), scope.clone()))
    });

    let backends = backends::build(&settings);
    let runner = Arc::new(LeaderRunner::new(
        Arc::new(settings.sync),
        backends.locker,
        backends.source,
        backends.destination,
    ));
    readiness.mark_ready();

    let result = run(runner, probe, scope.clone()).await;
    scope.cancel();
    signals.abort();
    result
}

/// Drive the runner, ending early if the readiness probe fails.
async fn run(
    runner: Arc<LeaderRunner>,
    probe: Option<JoinHandle<targetsync_web::Result<()>>>,
    scope: CancellationToken,
) -> Result<()> {
    let mut task = tokio::spawn({
        let scope = scope.clone();
        async move { runner.run(scope).await }
    });

    let Some(mut probe) = probe else {
        return finish(task.await.context("Leader runner task failed")?);
    };

    tokio::select! {
        ran = &mut task => {
            scope.cancel();
            if let Err(e) = probe.await {
                warn!(error = %e, "Readiness probe task failed");
            }
            finish(ran.context("Leader runner task failed")?)
        }
        served = &mut probe => {
            scope.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "Leader runner task failed");
            }
            served
                .context("Readiness probe task failed")?
                .context("Readiness probe failed")?;
            info!("Shutdown complete");
            Ok(())
        }
    }
}

fn finish(result: targetsync_core::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancelled() => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "targetsync stopped");
            Err(e).context("Syncer failed")
        }
    }
}

/// Initialize tracing; `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(level: LogLevel) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
