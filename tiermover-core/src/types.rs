//! Cycle-scoped data passed between the ledger, scanner, planner and
//! relocator. Nothing here outlives a single eviction cycle.

use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of media entry reported by the playback ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Episode,
    Other,
}

impl MediaKind {
    /// Maps a Jellyfin `Type` value onto a kind. Unknown values become
    /// [`MediaKind::Other`].
    pub fn from_jellyfin(value: &str) -> Self {
        match value {
            "Movie" => MediaKind::Movie,
            "Episode" => MediaKind::Episode,
            _ => MediaKind::Other,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Episode => write!(f, "episode"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// A media entry from the playback ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: Option<String>,
    /// Display name; this is what gets matched against cache paths.
    pub name: String,
    pub kind: MediaKind,
    pub consumed: bool,
}

impl MediaItem {
    /// Convenience constructor for a fully watched item.
    pub fn consumed(name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            consumed: true,
        }
    }
}

/// A media file resident on the fast tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    pub path: PathBuf,
    /// File stem, e.g. `Show S01E01` for `.../Show S01E01.mp4`.
    pub media_name: String,
    pub size: u64,
}

impl CacheFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let media_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            media_name,
            size,
        }
    }
}

/// A planned move of one cache file onto the bulk tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Display name of the consumed item that selected this file.
    pub matched_item: String,
    /// Size observed by the scanner. The relocator refuses to move the file
    /// if its current size differs.
    pub size: u64,
}

impl RelocationTask {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}
