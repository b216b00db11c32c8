//! # tiermover
//!
//! Keeps an Unraid cache pool from filling up by moving media that Jellyfin
//! reports as watched onto the parity-protected array.
//!
//! Each cycle measures cache utilization, and only when it is at or above
//! `cache_threshold` asks Jellyfin for played items, matches them against
//! files on the cache and relocates the matches to the same relative path
//! under `array_path`.

use anyhow::Context;
use clap::Parser;
use tiermover_config::{ConfigLoad, ConfigSource};
use tiermover_daemon::{Cli, Daemon, build_cycle, init_tracing, shutdown_signal};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ConfigLoad {
        mut config,
        warnings,
        source,
        env_file_loaded,
        env_overrides,
    } = cli
        .config_loader()
        .load()
        .context("failed to load configuration")?;

    if let Some(minutes) = cli.interval_minutes {
        anyhow::ensure!(minutes > 0, "--interval-minutes must be greater than zero");
        config.check_interval = minutes;
    }

    init_tracing(config.log_file.as_deref(), config.log_max_files)?;

    if env_file_loaded {
        info!("loaded .env file");
    }
    match &source {
        ConfigSource::File(path) => {
            info!(path = %path.display(), "configuration loaded")
        }
        ConfigSource::CreatedDefault(path) => {
            info!(path = %path.display(), "configuration file created with defaults")
        }
    }
    for var in &env_overrides {
        info!(var, "configuration value taken from environment");
    }
    for warning in &warnings {
        match &warning.hint {
            Some(hint) => warn!(
                field = warning.field,
                message = %warning.message,
                hint = %hint,
                "configuration warning"
            ),
            None => warn!(
                field = warning.field,
                message = %warning.message,
                "configuration warning"
            ),
        }
    }

    info!(
        jellyfin = %config.jellyfin_url,
        cache = %config.cache_path.display(),
        array = %config.array_path.display(),
        threshold = config.cache_threshold,
        interval = %humantime::format_duration(config.check_interval()),
        strategy = ?config.move_strategy,
        max_parallel_moves = config.max_parallel_moves,
        "tiermover configuration in effect"
    );

    let (cycle, ledger) = build_cycle(&config)?;

    if let Err(err) = ledger.verify_credentials().await {
        if err.is_unauthorized() {
            error!(error = %err, "Jellyfin rejected the API key");
            return Err(err).context("Jellyfin credential check failed");
        }
        warn!(
            error = %err,
            "Jellyfin is not reachable yet; cycles will keep retrying"
        );
    }

    let mut daemon = Daemon::new(cycle, config.check_interval());

    if cli.once {
        let result = daemon.run_once().await;
        info!(%result, "single cycle finished");
        return Ok(());
    }

    let shutdown = shutdown_signal()?;
    let cycles = daemon.run_until(shutdown).await;
    info!(cycles, "tiermover stopped");
    Ok(())
}
