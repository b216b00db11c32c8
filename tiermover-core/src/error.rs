use std::path::PathBuf;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Cycle-level failures. Any of these aborts the current eviction cycle
/// without moving files; none of them stops the daemon.
#[derive(Error, Debug)]
pub enum EvictionError {
    #[error("tier unavailable at {}: {reason}", path.display())]
    TierUnavailable { path: PathBuf, reason: String },

    #[error("playback ledger unreachable after {attempts} attempt(s): {source}")]
    LedgerUnreachable {
        attempts: u16,
        #[source]
        source: LedgerError,
    },

    #[error("playback ledger request failed: {0}")]
    Ledger(#[source] LedgerError),

    #[error("cache scan failed at {}: {reason}", path.display())]
    ScanFailed { path: PathBuf, reason: String },
}

impl EvictionError {
    /// Short stable label used in structured log fields.
    pub fn label(&self) -> &'static str {
        match self {
            EvictionError::TierUnavailable { .. } => "tier_unavailable",
            EvictionError::LedgerUnreachable { .. } => "ledger_unreachable",
            EvictionError::Ledger(_) => "ledger_error",
            EvictionError::ScanFailed { .. } => "scan_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, EvictionError>;
