use std::path::PathBuf;

use clap::Parser;
use tiermover_config::ConfigLoader;

/// CLI entry point
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tiermover")]
#[command(
    about = "Moves watched media from the cache tier to the array when the cache fills up"
)]
pub struct Cli {
    /// Path to the JSON or TOML config file
    #[arg(long, env = "TIERMOVER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Minutes between cycles (overrides check_interval)
    #[arg(long, value_name = "MINUTES")]
    pub interval_minutes: Option<u64>,
}

impl Cli {
    pub fn config_loader(&self) -> ConfigLoader {
        match &self.config {
            Some(path) => ConfigLoader::new().with_path(path),
            None => ConfigLoader::new(),
        }
    }
}
