//! Filesystem primitives used by the executor's `process` routine: a
//! write-then-rename file copy with a cancellation check at each chunk
//! boundary, a best-effort remove, and an idempotent mkdir-p.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use filetime::FileTime;
use tokio_util::sync::CancellationToken;

use crate::types::SyncError;

const CHUNK_SIZE: usize = 128 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Copy `src`'s contents to `dest` via a temp-file-then-rename, stamping the
/// destination's mod_time from the source. Checked for cancellation at every
/// chunk boundary.
pub fn copy_file(src: &Path, dest: &Path, cancel: &CancellationToken) -> Result<(), SyncError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }

    // `dest` may still be an empty directory left over from a stale
    // observation (the scheduler only learns to replace a directory with a
    // file once the directory is actually tracked); renaming a file onto a
    // directory fails with EISDIR on Linux, so clear the obstruction first.
    if let Ok(metadata) = fs::symlink_metadata(dest) {
        if metadata.is_dir() {
            remove_path(dest)?;
        }
    }

    let temp_path = temp_path_for(dest);
    let result = copy_file_inner(src, dest, &temp_path, cancel);
    if result.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn copy_file_inner(
    src: &Path,
    dest: &Path,
    temp_path: &Path,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let mut src_file = File::open(src).map_err(|e| map_io(src, e))?;
    let mut temp_file = File::create(temp_path).map_err(|e| map_io(dest, e))?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Canceled);
        }

        let bytes_read = src_file.read(&mut buffer).map_err(|e| map_io(src, e))?;
        if bytes_read == 0 {
            break;
        }
        temp_file
            .write_all(&buffer[..bytes_read])
            .map_err(|e| map_io(dest, e))?;
    }

    temp_file.sync_all().map_err(|e| map_io(dest, e))?;
    drop(temp_file);

    let src_mtime = fs::metadata(src)
        .and_then(|m| m.modified())
        .map_err(|e| map_io(src, e))?;
    filetime::set_file_mtime(temp_path, FileTime::from_system_time(src_mtime))
        .map_err(|e| map_io(dest, e))?;

    fs::rename(temp_path, dest).map_err(|e| map_io(dest, e))
}

/// Best-effort remove: a missing path or a non-empty-directory removal are
/// both treated as success.
pub fn remove_path(path: &Path) -> Result<(), SyncError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(map_io(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if is_directory_not_empty(&e) => Ok(()),
        Err(e) => Err(map_io(path, e)),
    }
}

/// Idempotent `mkdir -p`.
pub fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    fs::create_dir_all(path).map_err(|e| map_io(path, e))
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let basename = dest.file_name().unwrap_or_else(|| OsStr::new("dirsync_tmp"));
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut temp_name = OsString::from(".");
    temp_name.push(basename);
    temp_name.push(".dirsync.part.");
    temp_name.push(std::process::id().to_string());
    temp_name.push(".");
    temp_name.push(unique.to_string());

    dest.with_file_name(temp_name)
}

fn is_directory_not_empty(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::DirectoryNotEmpty || matches!(e.raw_os_error(), Some(39))
}

fn map_io(path: &Path, e: std::io::Error) -> SyncError {
    if e.kind() == ErrorKind::PermissionDenied {
        SyncError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        SyncError::Io(e)
    }
}
