//! Eviction planning.
//!
//! Matching is deliberately coarse: a consumed item selects every cache file
//! whose full path contains the item's display name, compared
//! case-sensitively. The ledger exposes no identifier that maps to files on
//! disk, so short or generic names can over-match and renamed files will not
//! match at all.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::{CacheFile, MediaItem, RelocationTask};

/// Whether `item` selects `file`.
pub fn matches(item: &MediaItem, file: &CacheFile) -> bool {
    !item.name.is_empty()
        && file.path.to_string_lossy().contains(item.name.as_str())
}

/// Substitutes the `cache_root` prefix of `source` with `array_root`,
/// keeping the remainder of the path verbatim. `None` if `source` is not
/// under `cache_root`.
pub fn destination_for(
    source: &Path,
    cache_root: &Path,
    array_root: &Path,
) -> Option<PathBuf> {
    let relative = source.strip_prefix(cache_root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(array_root.join(relative))
}

/// Builds the relocation plan for one cycle.
///
/// Pure: no filesystem access. Output order follows the input order (items
/// outer, files inner) and each source path appears at most once.
pub fn plan(
    consumed_items: &[MediaItem],
    cache_files: &[CacheFile],
    cache_root: &Path,
    array_root: &Path,
) -> Vec<RelocationTask> {
    let mut planned: HashSet<&Path> = HashSet::new();
    let mut tasks = Vec::new();

    for item in consumed_items.iter().filter(|item| item.consumed) {
        if item.name.is_empty() {
            debug!(id = ?item.id, "ignoring consumed item with empty name");
            continue;
        }

        for file in cache_files {
            if !matches(item, file) || planned.contains(file.path.as_path()) {
                continue;
            }

            let Some(destination) =
                destination_for(&file.path, cache_root, array_root)
            else {
                debug!(
                    path = %file.path.display(),
                    "matched file is outside the cache root"
                );
                continue;
            };

            planned.insert(file.path.as_path());
            tasks.push(RelocationTask {
                source: file.path.clone(),
                destination,
                matched_item: item.name.clone(),
                size: file.size,
            });
        }
    }

    tasks
}
