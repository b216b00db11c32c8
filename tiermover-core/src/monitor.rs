//! Fast-tier pressure measurement.

use std::path::Path;

use async_trait::async_trait;
use nix::sys::statvfs::statvfs;
use tracing::debug;

use crate::error::{EvictionError, Result};

/// Reports how full a storage tier is.
///
/// Implementations must return [`EvictionError::TierUnavailable`] when the
/// tier cannot be measured. A failed measurement is never reported as 0%.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TierMonitor: Send + Sync {
    /// Used capacity as a fraction in `[0, 1]`.
    async fn usage_fraction(&self, tier: &Path) -> Result<f64>;
}

/// Capacity statistics for a mounted filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCapacity {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl TierCapacity {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// `None` when the filesystem reports no capacity at all.
    pub fn used_fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        let fraction = self.used_bytes() as f64 / self.total_bytes as f64;
        Some(fraction.clamp(0.0, 1.0))
    }
}

/// [`TierMonitor`] backed by `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsMonitor;

impl StatvfsMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Blocking capacity read for `tier`.
    pub fn capacity(tier: &Path) -> Result<TierCapacity> {
        let stat = statvfs(tier).map_err(|errno| {
            EvictionError::TierUnavailable {
                path: tier.to_path_buf(),
                reason: errno.to_string(),
            }
        })?;

        let fragment = stat.fragment_size() as u64;
        Ok(TierCapacity {
            total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
            free_bytes: (stat.blocks_free() as u64).saturating_mul(fragment),
        })
    }

    pub fn measure(tier: &Path) -> Result<f64> {
        let capacity = Self::capacity(tier)?;
        debug!(
            tier = %tier.display(),
            total_bytes = capacity.total_bytes,
            used_bytes = capacity.used_bytes(),
            "tier capacity read"
        );
        capacity
            .used_fraction()
            .ok_or_else(|| EvictionError::TierUnavailable {
                path: tier.to_path_buf(),
                reason: "filesystem reports zero capacity".into(),
            })
    }
}

#[async_trait]
impl TierMonitor for StatvfsMonitor {
    async fn usage_fraction(&self, tier: &Path) -> Result<f64> {
        let owned = tier.to_path_buf();
        tokio::task::spawn_blocking(move || Self::measure(&owned))
            .await
            .map_err(|join| EvictionError::TierUnavailable {
                path: tier.to_path_buf(),
                reason: format!("capacity query did not complete: {join}"),
            })?
    }
}
