use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{EvictionError, Result};
use crate::types::CacheFile;

/// Container formats considered for eviction.
pub const DEFAULT_MEDIA_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "m4v"];

/// Enumerates media files resident on the fast tier.
#[derive(Debug, Clone)]
pub struct CacheScanner {
    /// Recognised extensions, lowercase and without the leading dot
    pub media_extensions: Vec<String>,
    /// Whether to follow symbolic links
    pub follow_links: bool,
}

impl Default for CacheScanner {
    fn default() -> Self {
        Self {
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            follow_links: false,
        }
    }
}

impl CacheScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the recognised extensions
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.media_extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Check if a file is a media container based on extension
    pub fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.media_extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Start a lazy walk of `cache_root`.
    ///
    /// Only the root is validated up front. Entries that vanish or cannot be
    /// read while the walk is running are skipped. Calling `scan` again
    /// starts a fresh walk.
    pub fn scan<P: AsRef<Path>>(&self, cache_root: P) -> Result<CacheScan> {
        let root = cache_root.as_ref();

        let metadata = std::fs::metadata(root).map_err(|e| {
            EvictionError::ScanFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        if !metadata.is_dir() {
            return Err(EvictionError::ScanFailed {
                path: root.to_path_buf(),
                reason: "not a directory".into(),
            });
        }

        info!(root = %root.display(), "starting cache scan");

        Ok(CacheScan {
            root: root.to_path_buf(),
            walker: WalkDir::new(root)
                .follow_links(self.follow_links)
                .into_iter(),
            scanner: self.clone(),
            found: 0,
            skipped: 0,
        })
    }
}

/// Iterator over the media files under a cache root. Order is unspecified.
#[derive(Debug)]
pub struct CacheScan {
    root: PathBuf,
    walker: walkdir::IntoIter,
    scanner: CacheScanner,
    found: usize,
    skipped: usize,
}

impl CacheScan {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries skipped so far because they vanished or were unreadable.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn process_entry(&mut self, entry: DirEntry) -> Option<CacheFile> {
        if !entry.file_type().is_file() {
            return None;
        }

        let path = entry.path();
        if !self.scanner.is_media_file(path) {
            return None;
        }

        match entry.metadata() {
            Ok(metadata) => {
                debug!(path = %path.display(), size = metadata.len(), "found cache file");
                Some(CacheFile::new(entry.into_path(), metadata.len()))
            }
            Err(e) => {
                self.record_error(&e);
                None
            }
        }
    }

    fn record_error(&mut self, err: &walkdir::Error) {
        self.skipped += 1;
        let vanished = err
            .io_error()
            .map(|io| io.kind() == io::ErrorKind::NotFound)
            .unwrap_or(false);
        let path = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        if vanished {
            debug!(%path, "entry disappeared during scan");
        } else {
            warn!(%path, error = %err, "skipping unreadable entry");
        }
    }
}

impl Iterator for CacheScan {
    type Item = CacheFile;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.walker.next() {
                None => {
                    info!(
                        root = %self.root.display(),
                        found = self.found,
                        skipped = self.skipped,
                        "cache scan complete"
                    );
                    return None;
                }
                Some(Ok(entry)) => {
                    if let Some(file) = self.process_entry(entry) {
                        self.found += 1;
                        return Some(file);
                    }
                }
                Some(Err(err)) => self.record_error(&err),
            }
        }
    }
}
