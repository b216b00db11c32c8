//! # tiermover core
//!
//! Decision and relocation logic for evicting consumed media from a fast
//! cache tier onto a bulk array tier.
//!
//! ## Overview
//!
//! One eviction cycle flows through these pieces, leaf first:
//!
//! - [`monitor`]: fast-tier utilization via `statvfs`, as a tagged result
//! - [`ledger`]: fully watched items from a Jellyfin server
//! - [`scanner`]: media files currently resident on the cache tier
//! - [`planner`]: pure matching of consumed items to cache files
//! - [`relocator`]: verified, retrying tier-to-tier moves
//! - [`cycle`]: the controller tying one pass together
//!
//! [`retry`] holds the backoff policy shared by the ledger client and the
//! relocator.
//!
//! ## Examples
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use tiermover_core::{
//!     CacheScanner, CycleSettings, EvictionCycle, JellyfinClient,
//!     MoveStrategy, Relocator, RetryPolicy, StatvfsMonitor,
//! };
//!
//! async fn one_pass() -> Result<(), Box<dyn std::error::Error>> {
//!     let retry = RetryPolicy::default();
//!     let ledger = JellyfinClient::new(
//!         "http://jellyfin.local:8096",
//!         "api-key",
//!         Duration::from_secs(30),
//!         retry,
//!     )?;
//!     let mut cycle = EvictionCycle::new(
//!         Arc::new(StatvfsMonitor::new()),
//!         Arc::new(ledger),
//!         CacheScanner::new(),
//!         Relocator::new(MoveStrategy::RenameOrCopy, retry),
//!         CycleSettings::new("/mnt/cache", "/mnt/user", 90.0),
//!     );
//!     let result = cycle.run_cycle().await;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod cycle;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod planner;
pub mod relocator;
pub mod retry;
pub mod scanner;
pub mod types;

pub use cycle::{
    CycleOutcome, CycleResult, CycleSettings, CycleState, EvictionCycle,
    RelocationFailure,
};
pub use error::{EvictionError, Result};
pub use ledger::{JellyfinClient, LedgerError, PlaybackLedger};
pub use monitor::{StatvfsMonitor, TierCapacity, TierMonitor};
pub use relocator::{
    MoveStrategy, RelocationError, RelocationOutcome, Relocator,
    TransferMethod,
};
pub use retry::{RetryConfig, RetryError, RetryPolicy};
pub use scanner::{CacheScan, CacheScanner, DEFAULT_MEDIA_EXTENSIONS};
pub use types::{CacheFile, MediaItem, MediaKind, RelocationTask};
