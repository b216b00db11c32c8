//! One eviction pass: check pressure, plan, relocate, report.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{EvictionError, Result};
use crate::ledger::PlaybackLedger;
use crate::monitor::TierMonitor;
use crate::planner;
use crate::relocator::{RelocationError, Relocator};
use crate::scanner::CacheScanner;
use crate::types::{CacheFile, RelocationTask};

/// Controller states. A pass always starts and ends in [`CycleState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    CheckingPressure,
    Planning,
    Executing,
    Reporting,
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub cache_root: PathBuf,
    pub array_root: PathBuf,
    /// Utilization fraction in `[0, 1]` at or above which files are moved.
    pub threshold: f64,
    /// Size of the relocation worker pool.
    pub max_parallel_moves: usize,
}

impl CycleSettings {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        array_root: impl Into<PathBuf>,
        threshold_percent: f64,
    ) -> Self {
        Self {
            cache_root: cache_root.into(),
            array_root: array_root.into(),
            threshold: (threshold_percent / 100.0).clamp(0.0, 1.0),
            max_parallel_moves: 1,
        }
    }

    pub fn with_max_parallel_moves(mut self, workers: usize) -> Self {
        self.max_parallel_moves = workers.max(1);
        self
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Pressure was measured and is below the threshold.
    BelowThreshold,
    /// The cycle could not run to completion; nothing was moved.
    Skipped(EvictionError),
    /// The plan was executed; see the counters for per-file results.
    Completed,
}

#[derive(Debug)]
pub struct RelocationFailure {
    pub source: PathBuf,
    pub error: RelocationError,
}

/// Summary of a single eviction pass.
#[derive(Debug)]
pub struct CycleResult {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: CycleOutcome,
    pub utilization_before: Option<f64>,
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_moved: u64,
    pub failures: Vec<RelocationFailure>,
}

impl CycleResult {
    fn new(started_at: DateTime<Utc>, outcome: CycleOutcome) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            outcome,
            utilization_before: None,
            planned: 0,
            succeeded: 0,
            failed: 0,
            bytes_moved: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Skipped(_))
    }

    /// Emits the one summary line per cycle.
    pub fn log(&self) {
        let utilization = self
            .utilization_before
            .map(|u| format!("{:.2}%", u * 100.0))
            .unwrap_or_else(|| "unknown".into());

        match &self.outcome {
            CycleOutcome::BelowThreshold => info!(
                %utilization,
                "cache usage below threshold, no action needed"
            ),
            CycleOutcome::Skipped(reason) => warn!(
                %utilization,
                reason = reason.label(),
                error = %reason,
                "eviction cycle skipped"
            ),
            CycleOutcome::Completed => {
                for failure in &self.failures {
                    warn!(
                        source = %failure.source.display(),
                        kind = failure.error.label(),
                        error = %failure.error,
                        "file left on cache tier"
                    );
                }
                info!(
                    %utilization,
                    planned = self.planned,
                    succeeded = self.succeeded,
                    failed = self.failed,
                    bytes_moved = self.bytes_moved,
                    elapsed_ms = self.elapsed.as_millis() as u64,
                    "eviction cycle complete"
                );
            }
        }
    }
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CycleOutcome::BelowThreshold => write!(f, "below threshold"),
            CycleOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            CycleOutcome::Completed => write!(
                f,
                "{} planned / {} succeeded / {} failed",
                self.planned, self.succeeded, self.failed
            ),
        }
    }
}

/// Drives eviction passes. Passes never overlap: `run_cycle` takes
/// `&mut self`.
pub struct EvictionCycle {
    monitor: Arc<dyn TierMonitor>,
    ledger: Arc<dyn PlaybackLedger>,
    scanner: CacheScanner,
    relocator: Relocator,
    settings: CycleSettings,
    state: CycleState,
}

impl fmt::Debug for EvictionCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictionCycle")
            .field("scanner", &self.scanner)
            .field("relocator", &self.relocator)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl EvictionCycle {
    pub fn new(
        monitor: Arc<dyn TierMonitor>,
        ledger: Arc<dyn PlaybackLedger>,
        scanner: CacheScanner,
        relocator: Relocator,
        settings: CycleSettings,
    ) -> Self {
        Self {
            monitor,
            ledger,
            scanner,
            relocator,
            settings,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    fn transition(&mut self, next: CycleState) {
        debug!(from = ?self.state, to = ?next, "cycle state");
        self.state = next;
    }

    /// Runs one complete pass and returns its summary. The summary is also
    /// logged.
    pub async fn run_cycle(&mut self) -> CycleResult {
        let clock = Instant::now();
        let started_at = Utc::now();

        self.transition(CycleState::CheckingPressure);
        let usage = match self
            .monitor
            .usage_fraction(&self.settings.cache_root)
            .await
        {
            Ok(usage) => usage,
            Err(err) => {
                let result = CycleResult::new(
                    started_at,
                    CycleOutcome::Skipped(err),
                );
                return self.report(result, clock);
            }
        };

        if usage < self.settings.threshold {
            let mut result =
                CycleResult::new(started_at, CycleOutcome::BelowThreshold);
            result.utilization_before = Some(usage);
            result.elapsed = clock.elapsed();
            result.log();
            self.transition(CycleState::Idle);
            return result;
        }

        self.transition(CycleState::Planning);
        let tasks = match self.build_plan().await {
            Ok(tasks) => tasks,
            Err(err) => {
                let mut result = CycleResult::new(
                    started_at,
                    CycleOutcome::Skipped(err),
                );
                result.utilization_before = Some(usage);
                return self.report(result, clock);
            }
        };

        self.transition(CycleState::Executing);
        let mut result =
            CycleResult::new(started_at, CycleOutcome::Completed);
        result.utilization_before = Some(usage);
        self.execute(tasks, &mut result).await;

        self.report(result, clock)
    }

    fn report(&mut self, mut result: CycleResult, clock: Instant) -> CycleResult {
        self.transition(CycleState::Reporting);
        result.elapsed = clock.elapsed();
        result.log();
        self.transition(CycleState::Idle);
        result
    }

    async fn build_plan(&self) -> Result<Vec<RelocationTask>> {
        let consumed = self.ledger.fetch_consumed_items().await?;
        info!(consumed = consumed.len(), "fetched consumed items");
        if consumed.is_empty() {
            return Ok(Vec::new());
        }

        let files = self.scan_cache().await?;
        let tasks = planner::plan(
            &consumed,
            &files,
            &self.settings.cache_root,
            &self.settings.array_root,
        );
        info!(
            cache_files = files.len(),
            planned = tasks.len(),
            "eviction plan ready"
        );
        Ok(tasks)
    }

    async fn scan_cache(&self) -> Result<Vec<CacheFile>> {
        let scanner = self.scanner.clone();
        let root = self.settings.cache_root.clone();

        tokio::task::spawn_blocking(move || {
            scanner.scan(&root).map(|scan| scan.collect::<Vec<_>>())
        })
        .await
        .map_err(|join| scan_failed(&self.settings.cache_root, join))?
    }

    async fn execute(&self, tasks: Vec<RelocationTask>, result: &mut CycleResult) {
        result.planned = tasks.len();
        let relocator = &self.relocator;

        let outcomes: Vec<_> = stream::iter(tasks)
            .map(|task| async move {
                let outcome = relocator.relocate(&task).await;
                (task, outcome)
            })
            .buffer_unordered(self.settings.max_parallel_moves.max(1))
            .collect()
            .await;

        for (task, outcome) in outcomes {
            match outcome {
                Ok(moved) => {
                    result.succeeded += 1;
                    result.bytes_moved += moved.bytes;
                }
                Err(error) => {
                    result.failed += 1;
                    result.failures.push(RelocationFailure {
                        source: task.source,
                        error,
                    });
                }
            }
        }
    }
}

fn scan_failed(root: &Path, join: tokio::task::JoinError) -> EvictionError {
    EvictionError::ScanFailed {
        path: root.to_path_buf(),
        reason: format!("scan task did not complete: {join}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, MockPlaybackLedger};
    use crate::monitor::MockTierMonitor;
    use crate::relocator::MoveStrategy;
    use crate::retry::RetryPolicy;
    use crate::types::{MediaItem, MediaKind};
    use reqwest::StatusCode;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        cache: PathBuf,
        array: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cache = dir.path().join("cache");
            let array = dir.path().join("array");
            fs::create_dir_all(&cache).unwrap();
            fs::create_dir_all(&array).unwrap();
            Self {
                _dir: dir,
                cache,
                array,
            }
        }

        fn put(&self, relative: &str) -> PathBuf {
            let path = self.cache.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, relative.as_bytes()).unwrap();
            path
        }

        fn cycle(
            &self,
            monitor: MockTierMonitor,
            ledger: MockPlaybackLedger,
        ) -> EvictionCycle {
            EvictionCycle::new(
                Arc::new(monitor),
                Arc::new(ledger),
                CacheScanner::new(),
                Relocator::new(
                    MoveStrategy::RenameOrCopy,
                    RetryPolicy::immediate(3),
                ),
                CycleSettings::new(&self.cache, &self.array, 90.0),
            )
        }
    }

    fn usage(fraction: f64) -> MockTierMonitor {
        let mut monitor = MockTierMonitor::new();
        monitor
            .expect_usage_fraction()
            .times(1)
            .returning(move |_| Ok(fraction));
        monitor
    }

    fn ledger_with(names: &'static [&'static str]) -> MockPlaybackLedger {
        let mut ledger = MockPlaybackLedger::new();
        ledger.expect_fetch_consumed_items().times(1).returning(|| {
            Ok(names
                .iter()
                .map(|name| MediaItem::consumed(*name, MediaKind::Episode))
                .collect())
        });
        ledger
    }

    fn untouched_ledger() -> MockPlaybackLedger {
        let mut ledger = MockPlaybackLedger::new();
        ledger.expect_fetch_consumed_items().times(0);
        ledger
    }

    #[tokio::test]
    async fn below_threshold_short_circuits() {
        let fixture = Fixture::new();
        let file = fixture.put("TV/Show S01E01.mp4");
        let mut cycle = fixture.cycle(usage(0.50), untouched_ledger());

        let result = cycle.run_cycle().await;

        assert!(matches!(result.outcome, CycleOutcome::BelowThreshold));
        assert_eq!(result.utilization_before, Some(0.50));
        assert_eq!(result.planned, 0);
        assert!(file.exists());
        assert_eq!(cycle.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let fixture = Fixture::new();
        let mut cycle = fixture.cycle(usage(0.90), ledger_with(&[]));

        let result = cycle.run_cycle().await;

        assert!(matches!(result.outcome, CycleOutcome::Completed));
        assert_eq!(result.planned, 0);
    }

    #[tokio::test]
    async fn over_threshold_moves_consumed_files() {
        let fixture = Fixture::new();
        let watched = fixture.put("TV/Show S01E01.mp4");
        let unwatched = fixture.put("TV/Show S01E02.mp4");
        let mut cycle =
            fixture.cycle(usage(0.95), ledger_with(&["Show S01E01"]));

        let result = cycle.run_cycle().await;

        assert!(matches!(result.outcome, CycleOutcome::Completed));
        assert_eq!(
            (result.planned, result.succeeded, result.failed),
            (1, 1, 0)
        );
        assert!(!watched.exists());
        assert!(fixture.array.join("TV/Show S01E01.mp4").exists());
        assert!(unwatched.exists());
        assert_eq!(result.to_string(), "1 planned / 1 succeeded / 0 failed");
    }

    #[tokio::test]
    async fn unavailable_tier_skips_without_planning() {
        let fixture = Fixture::new();
        let file = fixture.put("Movies/Heat.mkv");
        let mut monitor = MockTierMonitor::new();
        monitor.expect_usage_fraction().times(1).returning(|path| {
            Err(EvictionError::TierUnavailable {
                path: path.to_path_buf(),
                reason: "stale file handle".into(),
            })
        });
        let mut cycle = fixture.cycle(monitor, untouched_ledger());

        let result = cycle.run_cycle().await;

        assert!(result.is_skipped());
        assert!(matches!(
            result.outcome,
            CycleOutcome::Skipped(EvictionError::TierUnavailable { .. })
        ));
        assert_eq!(result.utilization_before, None);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn unreachable_ledger_skips_without_moving() {
        let fixture = Fixture::new();
        let file = fixture.put("Movies/Heat.mkv");
        let mut ledger = MockPlaybackLedger::new();
        ledger.expect_fetch_consumed_items().times(1).returning(|| {
            Err(EvictionError::LedgerUnreachable {
                attempts: 3,
                source: LedgerError::HttpStatus {
                    status: StatusCode::BAD_GATEWAY,
                    url: "http://jellyfin/Items".into(),
                },
            })
        });
        let mut cycle = fixture.cycle(usage(0.99), ledger);

        let result = cycle.run_cycle().await;

        assert!(matches!(
            result.outcome,
            CycleOutcome::Skipped(EvictionError::LedgerUnreachable { .. })
        ));
        assert_eq!(result.utilization_before, Some(0.99));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn missing_cache_root_skips_the_cycle() {
        let fixture = Fixture::new();
        fs::remove_dir_all(&fixture.cache).unwrap();
        let mut cycle = fixture.cycle(usage(0.95), ledger_with(&["Heat"]));

        let result = cycle.run_cycle().await;

        assert!(matches!(
            result.outcome,
            CycleOutcome::Skipped(EvictionError::ScanFailed { .. })
        ));
    }

    #[tokio::test]
    async fn one_failure_does_not_cancel_siblings() {
        let fixture = Fixture::new();
        let blocked = fixture.put("Movies/Heat/Heat.mkv");
        let free = fixture.put("TV/Heat Wave S01E01.mkv");
        fs::write(fixture.array.join("Movies"), b"not a directory").unwrap();

        let mut cycle = fixture.cycle(usage(0.95), ledger_with(&["Heat"]));
        cycle.settings.max_parallel_moves = 2;

        let result = cycle.run_cycle().await;

        assert_eq!(
            (result.planned, result.succeeded, result.failed),
            (2, 1, 1)
        );
        assert_eq!(result.failures[0].source, blocked);
        assert!(blocked.exists());
        assert!(!free.exists());
    }
}
