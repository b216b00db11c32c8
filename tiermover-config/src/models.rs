use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiermover_core::{CycleSettings, MoveStrategy, RetryConfig, RetryPolicy};

pub const DEFAULT_CACHE_PATH: &str = "/mnt/cache";
pub const DEFAULT_ARRAY_PATH: &str = "/mnt/user";

/// Daemon configuration as stored on disk.
///
/// Every field has a default so a partial file (or none at all) still
/// parses; required values are enforced later by the guard rails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    /// Base URL of the Jellyfin server, e.g. `http://tower:8096`.
    pub jellyfin_url: String,
    /// API key sent as `X-MediaBrowser-Token`.
    pub jellyfin_api_key: String,
    /// Cache utilization percentage (0-100) at which eviction starts.
    pub cache_threshold: f64,
    /// Minutes to sleep between cycles.
    pub check_interval: u64,
    /// Mount point of the fast tier.
    pub cache_path: PathBuf,
    /// Mount point of the bulk tier.
    pub array_path: PathBuf,
    /// Per-request timeout for ledger calls.
    pub http_timeout_secs: u64,
    /// Backoff policy shared by ledger calls and file moves.
    pub retry: RetryConfig,
    /// Files relocated concurrently within one cycle.
    pub max_parallel_moves: usize,
    pub move_strategy: MoveStrategy,
    /// Optional log file written alongside stderr. Rotated daily; the
    /// date is inserted before the extension (`mover.2026-10-19.log`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Rotated log files kept before the oldest is deleted.
    pub log_max_files: usize,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            jellyfin_url: String::new(),
            jellyfin_api_key: String::new(),
            cache_threshold: 90.0,
            check_interval: 60,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            array_path: PathBuf::from(DEFAULT_ARRAY_PATH),
            http_timeout_secs: 30,
            retry: RetryConfig::default(),
            max_parallel_moves: 1,
            move_strategy: MoveStrategy::default(),
            log_file: None,
            log_max_files: 30,
        }
    }
}

impl MoverConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.saturating_mul(60))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.retry)
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings::new(
            &self.cache_path,
            &self.array_path,
            self.cache_threshold,
        )
        .with_max_parallel_moves(self.max_parallel_moves)
    }
}
