//! Tier-to-tier file moves.
//!
//! A move either completes (the file exists at the destination and no longer
//! exists at the source) or fails leaving the source untouched. Across
//! filesystems the file is copied to a hidden staging file next to the
//! destination, flushed, size-checked and renamed into place before the
//! source is removed.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::retry::{RetryError, RetryPolicy};
use crate::types::RelocationTask;

const STAGING_SUFFIX: &str = ".tiermover-partial";

/// How the relocator transfers data.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MoveStrategy {
    /// `rename(2)` when both tiers share a filesystem, verified copy
    /// otherwise.
    #[default]
    RenameOrCopy,
    /// Always use the verified copy path.
    CopyOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    Rename,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationOutcome {
    pub method: TransferMethod,
    pub bytes: u64,
    pub attempts: u16,
}

#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("permission denied at {}: {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no space left at {}: {source}", path.display())]
    NoSpace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transient I/O failure at {}: {source}", path.display())]
    Transient {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An I/O failure retrying cannot clear, such as a regular file where a
    /// directory is expected.
    #[error("I/O failure at {}: {source}", path.display())]
    Unrecoverable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "size verification failed for {}: expected {expected} bytes, found {actual}",
        path.display()
    )]
    VerificationFailed {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("source file {} no longer exists", path.display())]
    SourceMissing { path: PathBuf },

    #[error(
        "source file {} changed since the scan: {scanned} bytes then, {current} now",
        path.display()
    )]
    SourceChanged {
        path: PathBuf,
        scanned: u64,
        current: u64,
    },

    #[error("destination {} already exists", path.display())]
    DestinationExists { path: PathBuf },
}

impl RelocationError {
    /// Classifies an I/O failure at `path`. Only conditions that can clear
    /// on their own (a busy or briefly unreachable tier) are transient.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        let errno = source.raw_os_error().map(Errno::from_raw);

        if source.kind() == io::ErrorKind::PermissionDenied
            || errno == Some(Errno::EROFS)
        {
            RelocationError::PermissionDenied { path, source }
        } else if matches!(errno, Some(Errno::ENOSPC) | Some(Errno::EDQUOT)) {
            RelocationError::NoSpace { path, source }
        } else if is_transient_io(&source, errno) {
            RelocationError::Transient { path, source }
        } else {
            RelocationError::Unrecoverable { path, source }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RelocationError::Transient { .. })
    }

    /// Short stable label used in structured log fields.
    pub fn label(&self) -> &'static str {
        match self {
            RelocationError::PermissionDenied { .. } => "permission_denied",
            RelocationError::NoSpace { .. } => "no_space",
            RelocationError::Transient { .. } => "transient",
            RelocationError::Unrecoverable { .. } => "unrecoverable",
            RelocationError::VerificationFailed { .. } => "verification_failed",
            RelocationError::SourceMissing { .. } => "source_missing",
            RelocationError::SourceChanged { .. } => "source_changed",
            RelocationError::DestinationExists { .. } => "destination_exists",
        }
    }
}

fn is_transient_io(err: &io::Error, errno: Option<Errno>) -> bool {
    match errno {
        Some(errno) => matches!(
            errno,
            Errno::EIO
                | Errno::EINTR
                | Errno::EAGAIN
                | Errno::EBUSY
                | Errno::ETIMEDOUT
                | Errno::ESTALE
                | Errno::ENOTCONN
                | Errno::ECONNRESET
                | Errno::ECONNABORTED
                | Errno::ENETDOWN
                | Errno::ENETUNREACH
                | Errno::EHOSTUNREACH
                | Errno::ENOLCK
        ),
        None => matches!(
            err.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
        ),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EXDEV as i32)
}

/// `rename(2)` that fails with `AlreadyExists` instead of replacing an
/// existing destination.
async fn rename_no_replace(from: &Path, to: &Path) -> io::Result<()> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    tokio::task::spawn_blocking(move || rename_no_replace_blocking(&from, &to))
        .await
        .map_err(io::Error::other)?
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn rename_no_replace_blocking(from: &Path, to: &Path) -> io::Result<()> {
    use nix::fcntl::{RenameFlags, renameat2};

    match renameat2(None, from, None, to, RenameFlags::RENAME_NOREPLACE) {
        Ok(()) => Ok(()),
        // Filesystems without RENAME_NOREPLACE support (some FUSE mounts).
        Err(Errno::EINVAL) | Err(Errno::ENOSYS) => checked_rename(from, to),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn rename_no_replace_blocking(from: &Path, to: &Path) -> io::Result<()> {
    checked_rename(from, to)
}

fn checked_rename(from: &Path, to: &Path) -> io::Result<()> {
    if to.try_exists()? {
        return Err(io::Error::from(io::ErrorKind::AlreadyExists));
    }
    std::fs::rename(from, to)
}

/// Hidden sibling of `destination` used while a copy is in flight.
pub fn staging_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = destination.file_name() {
        name.push(file_name);
    }
    name.push(STAGING_SUFFIX);
    destination.with_file_name(name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Relocator {
    strategy: MoveStrategy,
    retry: RetryPolicy,
}

impl Relocator {
    pub fn new(strategy: MoveStrategy, retry: RetryPolicy) -> Self {
        Self { strategy, retry }
    }

    pub fn strategy(&self) -> MoveStrategy {
        self.strategy
    }

    /// Moves one file, retrying transient failures.
    pub async fn relocate(
        &self,
        task: &RelocationTask,
    ) -> Result<RelocationOutcome, RelocationError> {
        let mut attempts: u16 = 0;
        let result = self
            .retry
            .run("relocate", RelocationError::is_transient, || {
                attempts += 1;
                self.relocate_once(task)
            })
            .await
            .map_err(RetryError::into_inner);

        match result {
            Ok((method, bytes)) => {
                info!(
                    source = %task.source.display(),
                    destination = %task.destination.display(),
                    bytes,
                    ?method,
                    "moved file"
                );
                Ok(RelocationOutcome {
                    method,
                    bytes,
                    attempts,
                })
            }
            Err(err) => {
                warn!(
                    source = %task.source.display(),
                    kind = err.label(),
                    attempts,
                    error = %err,
                    "relocation failed; source left in place"
                );
                Err(err)
            }
        }
    }

    async fn relocate_once(
        &self,
        task: &RelocationTask,
    ) -> Result<(TransferMethod, u64), RelocationError> {
        let source = task.source.as_path();
        let destination = task.destination.as_path();

        let expected = match fs::metadata(source).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RelocationError::SourceMissing {
                    path: source.to_path_buf(),
                });
            }
            Err(e) => return Err(RelocationError::from_io(source, e)),
        };
        // A file still being written (or replaced) since the scan is left
        // for a later cycle.
        if expected != task.size {
            return Err(RelocationError::SourceChanged {
                path: source.to_path_buf(),
                scanned: task.size,
                current: expected,
            });
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RelocationError::from_io(parent, e))?;
        }

        // Checked up front so an occupied destination fails before any data
        // is copied; the renames below refuse to replace it regardless.
        let exists = fs::try_exists(destination)
            .await
            .map_err(|e| RelocationError::from_io(destination, e))?;
        if exists {
            return Err(destination_exists(destination));
        }

        if self.strategy == MoveStrategy::RenameOrCopy {
            match rename_no_replace(source, destination).await {
                Ok(()) => return Ok((TransferMethod::Rename, expected)),
                Err(e) if is_cross_device(&e) => {
                    debug!(
                        source = %source.display(),
                        "tiers are on different filesystems; copying"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(destination_exists(destination));
                }
                Err(e) => return Err(RelocationError::from_io(source, e)),
            }
        }

        copy_then_remove(source, destination, expected).await?;
        Ok((TransferMethod::Copy, expected))
    }
}

fn destination_exists(destination: &Path) -> RelocationError {
    RelocationError::DestinationExists {
        path: destination.to_path_buf(),
    }
}

async fn copy_then_remove(
    source: &Path,
    destination: &Path,
    expected: u64,
) -> Result<(), RelocationError> {
    let staging = staging_path(destination);

    if let Err(err) = stage_copy(source, &staging, expected).await {
        discard(&staging).await;
        return Err(err);
    }

    if let Err(e) = rename_no_replace(&staging, destination).await {
        discard(&staging).await;
        if e.kind() == io::ErrorKind::AlreadyExists {
            return Err(destination_exists(destination));
        }
        return Err(RelocationError::from_io(destination, e));
    }

    // From here the file exists in both places; any failure must undo the
    // destination copy before returning.
    let current = match checkpoint::reach(Checkpoint::Published, source) {
        Ok(()) => fs::metadata(source).await.map(|metadata| metadata.len()),
        Err(e) => Err(e),
    };
    let current = match current {
        Ok(len) => len,
        Err(e) => {
            discard(destination).await;
            return Err(RelocationError::from_io(source, e));
        }
    };
    if current != expected {
        discard(destination).await;
        return Err(RelocationError::VerificationFailed {
            path: source.to_path_buf(),
            expected,
            actual: current,
        });
    }

    if let Err(e) = remove_source(source).await {
        discard(destination).await;
        return Err(RelocationError::from_io(source, e));
    }

    Ok(())
}

async fn remove_source(source: &Path) -> io::Result<()> {
    checkpoint::reach(Checkpoint::RemovingSource, source)?;
    fs::remove_file(source).await
}

async fn stage_copy(
    source: &Path,
    staging: &Path,
    expected: u64,
) -> Result<(), RelocationError> {
    fs::copy(source, staging)
        .await
        .map_err(|e| RelocationError::from_io(staging, e))?;

    let file = fs::OpenOptions::new()
        .write(true)
        .open(staging)
        .await
        .map_err(|e| RelocationError::from_io(staging, e))?;
    file.sync_all()
        .await
        .map_err(|e| RelocationError::from_io(staging, e))?;

    checkpoint::reach(Checkpoint::Copied, staging)
        .map_err(|e| RelocationError::from_io(staging, e))?;
    verify_size(staging, expected).await
}

async fn verify_size(path: &Path, expected: u64) -> Result<(), RelocationError> {
    let actual = fs::metadata(path)
        .await
        .map_err(|e| RelocationError::from_io(path, e))?
        .len();
    if actual != expected {
        return Err(RelocationError::VerificationFailed {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial copy"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove partial copy")
        }
    }
}

/// Points in the copy path where tests can interfere with the files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkpoint {
    /// Staging file written and flushed, before its size is checked.
    Copied,
    /// Staging file renamed onto the destination; the source still exists.
    Published,
    /// About to unlink the source.
    RemovingSource,
}

#[cfg(not(test))]
mod checkpoint {
    use std::io;
    use std::path::Path;

    #[inline(always)]
    pub(super) fn reach(_point: super::Checkpoint, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
