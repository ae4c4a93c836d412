//! Parallel walk of S and C into the EntriesIndex.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use crate::index::EntriesIndex;
use crate::types::{PathInfo, SyncError};

/// Whether a scan ran to completion or was cut short by cancellation — not an
/// error in itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Canceled,
}

enum WalkError {
    Canceled,
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Run one full scan pass: reset the index, walk S and C concurrently on
/// independent threads, then garbage-collect fully-absent entries.
pub async fn scan_once(
    index: Arc<EntriesIndex>,
    src_root: PathBuf,
    copy_root: PathBuf,
    include_hidden: bool,
    include_empty_dirs: bool,
    cancel: CancellationToken,
) -> Result<ScanOutcome, SyncError> {
    index.prepare_for_scan();

    let walk_cancel = cancel.child_token();

    let src_index = Arc::clone(&index);
    let src_cancel = walk_cancel.clone();
    let src_handle = tokio::task::spawn_blocking(move || {
        walk_side(
            &src_root,
            include_hidden,
            include_empty_dirs,
            &src_cancel,
            |key, info| src_index.update(&key, |entry| entry.src = info),
        )
    });

    let copy_index = Arc::clone(&index);
    let copy_cancel = walk_cancel.clone();
    let copy_handle = tokio::task::spawn_blocking(move || {
        walk_side(
            &copy_root,
            include_hidden,
            include_empty_dirs,
            &copy_cancel,
            |key, info| copy_index.update(&key, |entry| entry.copy = info),
        )
    });

    let (src_result, copy_result) = tokio::join!(src_handle, copy_handle);

    let src_result = src_result
        .map_err(|e| SyncError::Fatal(format!("scanner src worker panicked: {e}")))?;
    let copy_result = copy_result
        .map_err(|e| SyncError::Fatal(format!("scanner copy worker panicked: {e}")))?;

    // Either side's failure cancels the other.
    let mut canceled = walk_cancel.is_cancelled();
    let mut fatal = None;
    for result in [src_result, copy_result] {
        match result {
            Ok(()) => {}
            Err(WalkError::Canceled) => canceled = true,
            Err(WalkError::Io { path, source }) => {
                walk_cancel.cancel();
                fatal.get_or_insert(SyncError::Scan { path, source });
            }
        }
    }

    if let Some(err) = fatal {
        return Err(err);
    }

    index.remove_obsolete();

    if canceled {
        Ok(ScanOutcome::Canceled)
    } else {
        Ok(ScanOutcome::Completed)
    }
}

fn walk_side(
    root: &Path,
    include_hidden: bool,
    include_empty_dirs: bool,
    cancel: &CancellationToken,
    mut record: impl FnMut(String, PathInfo),
) -> Result<(), WalkError> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .build();

    // Empty-directory synthesis: track directories seen versus used as a
    // parent; only directories that end up unused are truly empty.
    let mut candidate_dirs: HashSet<PathBuf> = HashSet::new();
    let mut used_dirs: HashSet<PathBuf> = HashSet::new();

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(WalkError::Canceled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                if io_err.kind() == std::io::ErrorKind::NotFound {
                    continue;
                }
                return Err(WalkError::Io {
                    path,
                    source: io_err,
                });
            }
        };

        if entry.depth() == 0 {
            // The root itself is never a key.
            continue;
        }

        let key = match relative_unix_path(root, entry.path()) {
            Some(key) => key,
            None => continue,
        };

        if !include_hidden && has_hidden_component(&key) {
            continue;
        }

        let file_type = match entry.file_type() {
            Some(ft) => ft,
            None => continue,
        };

        if file_type.is_dir() {
            if include_empty_dirs {
                candidate_dirs.insert(entry.path().to_path_buf());
                if let Some(parent) = entry.path().parent() {
                    used_dirs.insert(parent.to_path_buf());
                }
            }
            continue;
        }

        if !file_type.is_file() {
            // Symlinks and other non-regular entries are reported as absent.
            tracing::debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        }

        if include_empty_dirs {
            if let Some(parent) = entry.path().parent() {
                used_dirs.insert(parent.to_path_buf());
            }
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("stat failed"));
                if io_err.kind() == std::io::ErrorKind::NotFound {
                    continue;
                }
                return Err(WalkError::Io {
                    path: entry.path().to_path_buf(),
                    source: io_err,
                });
            }
        };

        let mod_time = match metadata.modified() {
            Ok(t) => t,
            Err(source) => {
                return Err(WalkError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                })
            }
        };

        record(
            key,
            PathInfo::file(entry.path().to_path_buf(), metadata.len(), mod_time),
        );
    }

    if include_empty_dirs {
        for dir in candidate_dirs.difference(&used_dirs) {
            if let Some(key) = relative_unix_path(root, dir) {
                if include_hidden || !has_hidden_component(&key) {
                    record(key, PathInfo::dir(dir.clone()));
                }
            }
        }
    }

    Ok(())
}

fn relative_unix_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Some(joined)
}

fn has_hidden_component(relative_key: &str) -> bool {
    relative_key
        .split('/')
        .any(|component| component.starts_with('.'))
}
