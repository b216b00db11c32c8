use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tiermover_config::MoverConfig;
use tiermover_core::{
    CacheScanner, CycleResult, EvictionCycle, JellyfinClient, Relocator,
    StatvfsMonitor,
};
use tracing::{info, warn};

/// Assembles the production cycle from a validated config.
///
/// Also returns the ledger client so the caller can check credentials
/// before the first pass.
pub fn build_cycle(
    config: &MoverConfig,
) -> anyhow::Result<(EvictionCycle, Arc<JellyfinClient>)> {
    let retry = config.retry_policy();
    let ledger = Arc::new(
        JellyfinClient::new(
            &config.jellyfin_url,
            config.jellyfin_api_key.clone(),
            config.http_timeout(),
            retry,
        )
        .context("failed to build Jellyfin client")?,
    );

    let cycle = EvictionCycle::new(
        Arc::new(StatvfsMonitor::new()),
        ledger.clone(),
        CacheScanner::new(),
        Relocator::new(config.move_strategy, retry),
        config.cycle_settings(),
    );
    Ok((cycle, ledger))
}

/// Runs cycles back to back with a fixed sleep in between.
#[derive(Debug)]
pub struct Daemon {
    cycle: EvictionCycle,
    interval: Duration,
}

impl Daemon {
    pub fn new(cycle: EvictionCycle, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass; the cycle logs its own summary.
    pub async fn run_once(&mut self) -> CycleResult {
        self.cycle.run_cycle().await
    }

    /// Loops until `shutdown` resolves. Shutdown is only observed between
    /// cycles, so a pass that has started always finishes its moves.
    ///
    /// Returns the number of cycles run.
    pub async fn run_until<F>(&mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0;

        loop {
            self.run_once().await;
            cycles += 1;

            let next_run = chrono::Duration::from_std(self.interval)
                .ok()
                .and_then(|delay| Utc::now().checked_add_signed(delay));
            info!(
                interval = %humantime::format_duration(self.interval),
                next_run = ?next_run.map(|at| at.to_rfc3339()),
                "sleeping until next cycle"
            );

            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles, "shutdown requested, exiting");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        cycles
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
///
/// The SIGTERM handler is installed eagerly so a signal arriving during
/// the first cycle is not lost.
pub fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(
        tokio::signal::unix::SignalKind::terminate(),
    )
    .context("failed to install SIGTERM handler")?;

    Ok(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    })
}
