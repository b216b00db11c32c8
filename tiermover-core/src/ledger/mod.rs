//! Playback ledger: the external record of what viewers have finished.

mod jellyfin;

pub use jellyfin::{JellyfinClient, TOKEN_HEADER};

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::error::Result;
use crate::types::MediaItem;

/// Source of fully consumed media items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackLedger: Send + Sync {
    /// Every movie and episode the ledger reports as fully watched.
    ///
    /// Fails with [`EvictionError::LedgerUnreachable`] once transient
    /// failures exhaust the retry budget, or [`EvictionError::Ledger`] for
    /// failures retrying cannot fix.
    ///
    /// [`EvictionError::LedgerUnreachable`]: crate::EvictionError::LedgerUnreachable
    /// [`EvictionError::Ledger`]: crate::EvictionError::Ledger
    async fn fetch_consumed_items(&self) -> Result<Vec<MediaItem>>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rejected the API token ({status})")]
    Unauthorized { status: StatusCode },

    #[error("ledger rejected request to {url} ({status})")]
    Rejected { status: StatusCode, url: String },

    #[error("ledger returned {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid ledger URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to decode ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Timeouts, connection failures, 5xx and 429 are worth retrying.
    /// Authentication and malformed requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request()
            }
            LedgerError::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
            }
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LedgerError::Unauthorized { .. })
    }
}
