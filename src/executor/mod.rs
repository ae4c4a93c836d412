//! Executor - worker pool that actualizes each task and performs its
//! filesystem operation.

pub mod ops;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::index::EntriesIndex;
use crate::scheduler::Task;
use crate::types::{EntryInfo, OperationKind, OperationStatus, PathInfo, SyncError};

/// Hard ceiling on how long `stop()` waits for workers to drain.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker pool that dequeues `Task`s and drives them through `process`.
pub struct Executor {
    index: Arc<EntriesIndex>,
    src_root: PathBuf,
    copy_root: PathBuf,
    include_empty_dirs: bool,
    scan_period: Duration,
    workers_count: usize,
}

/// A running pool; `stop` joins every worker, bounded by [`STOP_TIMEOUT`].
pub struct ExecutorHandle {
    workers: Vec<JoinHandle<()>>,
}

impl Executor {
    pub fn new(
        index: Arc<EntriesIndex>,
        src_root: PathBuf,
        copy_root: PathBuf,
        include_empty_dirs: bool,
        scan_period: Duration,
        workers_count: usize,
    ) -> Self {
        Self {
            index,
            src_root,
            copy_root,
            include_empty_dirs,
            scan_period,
            workers_count,
        }
    }

    /// Spawn `workers_count` independent workers, all pulling from the same
    /// queue.
    pub fn start(&self, queue_rx: mpsc::Receiver<Task>, cancel: CancellationToken) -> ExecutorHandle {
        let queue_rx = Arc::new(AsyncMutex::new(queue_rx));
        let mut workers = Vec::with_capacity(self.workers_count);

        for id in 0..self.workers_count {
            let queue_rx = Arc::clone(&queue_rx);
            let index = Arc::clone(&self.index);
            let src_root = self.src_root.clone();
            let copy_root = self.copy_root.clone();
            let include_empty_dirs = self.include_empty_dirs;
            let scan_period = self.scan_period;
            let cancel = cancel.clone();

            workers.push(tokio::spawn(async move {
                worker_loop(
                    id,
                    queue_rx,
                    index,
                    src_root,
                    copy_root,
                    include_empty_dirs,
                    scan_period,
                    cancel,
                )
                .await;
            }));
        }

        ExecutorHandle { workers }
    }
}

impl ExecutorHandle {
    /// Wait for every worker to leave its loop, bounded by a 5s timeout; on
    /// timeout it logs and returns rather than blocking shutdown forever.
    pub async fn stop(self) {
        let joined = tokio::time::timeout(
            STOP_TIMEOUT,
            futures_join_all(self.workers),
        )
        .await;

        match joined {
            Ok(_) => tracing::debug!("executor has been normally stopped"),
            Err(_) => tracing::error!(
                "executor has been abnormally stopped on timeout (awaiting for some its worker(s) failed)"
            ),
        }
    }
}

/// Minimal join-all so we don't need the `futures` crate for one call site.
/// A worker panic is caught by `tokio::spawn` itself (it never takes the
/// process down); logged here rather than propagated.
async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(join_err) = handle.await {
            if join_err.is_panic() {
                tracing::error!(error = %join_err, "executor worker panicked");
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    queue_rx: Arc<AsyncMutex<mpsc::Receiver<Task>>>,
    index: Arc<EntriesIndex>,
    src_root: PathBuf,
    copy_root: PathBuf,
    include_empty_dirs: bool,
    scan_period: Duration,
    cancel: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = queue_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe_task = rx.recv() => match maybe_task {
                    Some(task) => task,
                    None => return,
                },
            }
        };

        let path = task.path.clone();
        if let Err(err) = process(
            &cancel,
            task,
            &index,
            &src_root,
            &copy_root,
            include_empty_dirs,
            scan_period,
        )
        .await
        {
            tracing::error!(worker = id, path = %path, error = %err, "failed to execute the task");
        }
    }
}

/// The hardest routine in the system. Re-stats both sides just before acting,
/// reconciles the operation against whatever changed since scheduling, and
/// only then performs the filesystem mutation.
///
/// Steps 2-8 are all synchronous `std::fs` work, so they run on the blocking
/// pool via `spawn_blocking` rather than directly on this async worker's
/// runtime thread, the same way `scanner::walk` offloads its directory walk.
async fn process(
    ctx: &CancellationToken,
    mut task: Task,
    index: &Arc<EntriesIndex>,
    src_root: &Path,
    copy_root: &Path,
    include_empty_dirs: bool,
    scan_period: Duration,
) -> Result<(), SyncError> {
    // 1. Ready-or-discard.
    tokio::select! {
        _ = ctx.cancelled() => return Ok(()),
        result = &mut task.ready => {
            if result.is_err() {
                // Sender dropped without signaling; treat like a timeout.
                index.update(&task.path, |entry| entry.op = None);
                return Err(SyncError::TaskStale);
            }
        }
        _ = tokio::time::sleep(scan_period) => {
            index.update(&task.path, |entry| entry.op = None);
            return Err(SyncError::TaskStale);
        }
    }

    let path = task.path;
    let entry = task.entry;
    let src_path = src_root.join(&path);
    let copy_path = copy_root.join(&path);
    let ctx = ctx.clone();
    let index = Arc::clone(index);

    tokio::task::spawn_blocking(move || {
        actualize_and_execute(&ctx, &index, &path, entry, &src_path, &copy_path, include_empty_dirs)
    })
    .await
    .unwrap_or_else(|join_err| Err(SyncError::Fatal(format!("executor worker panicked: {join_err}"))))
}

/// Steps 2-8 of `process`, run on the blocking pool: actualize both sides,
/// reconcile the operation, write the reconciled state through, then perform
/// the filesystem mutation and publish its outcome.
fn actualize_and_execute(
    ctx: &CancellationToken,
    index: &Arc<EntriesIndex>,
    path: &str,
    mut entry: EntryInfo,
    src_path: &Path,
    copy_path: &Path,
    include_empty_dirs: bool,
) -> Result<(), SyncError> {
    // 2. Actualize: re-stat both sides and fold any drift into `entry`.
    let src_updated = actualize_side(src_path, &mut entry.src)?;
    let copy_updated = actualize_side(copy_path, &mut entry.copy)?;
    let updated = src_updated || copy_updated;

    // 3. Reconcile the operation against the fresh observation. The
    // scheduler always attaches an operation before enqueueing, so
    // `entry.op` is always populated here.
    let mut op = entry
        .op
        .take()
        .expect("scheduler always attaches an operation before enqueueing a task");

    if updated {
        if entry.requires_sync() {
            let kind = entry.resolve_operation_kind();
            if kind == OperationKind::None || (kind == OperationKind::CopyDir && !include_empty_dirs) {
                op.mark_canceled();
            } else if kind != op.kind {
                op.kind = kind;
            }
        } else {
            op.mark_canceled();
        }
    }

    if !op.is_terminal() {
        if ctx.is_cancelled() {
            op.mark_canceled();
        } else {
            op.mark_in_progress(ctx.child_token());
        }
    }

    // 4. Write-through: publish the reconciled operation before acting.
    entry.op = Some(op.clone());
    index.set(path, entry.clone());

    // 5. Nothing further to do unless the operation is now in progress.
    if op.status != OperationStatus::InProgress {
        return Ok(());
    }

    let op_cancel = op.cancel.clone().unwrap_or_else(CancellationToken::new);

    // 6. Execute.
    let outcome = execute(op.kind, src_path, copy_path, &op_cancel);

    // 7./8. Publish the final status.
    match outcome {
        Ok(()) => op.mark_completed(),
        Err(SyncError::Canceled) => op.mark_canceled(),
        Err(err) => {
            op.mark_failed();
            entry.op = Some(op);
            index.set(path, entry);
            return Err(err);
        }
    }

    entry.op = Some(op);
    index.set(path, entry);
    Ok(())
}

/// Re-stat one side of a task and fold drift from its snapshot into `side`.
/// Returns whether the observation changed. Any I/O error other than a
/// vanished entry fails the task outright.
fn actualize_side(path: &Path, side: &mut PathInfo) -> Result<bool, SyncError> {
    let fresh = match stat_path(path) {
        Ok(info) => info,
        Err(err) => return Err(err),
    };

    let changed = fresh.exists != side.exists
        || fresh.is_dir != side.is_dir
        || fresh.size != side.size
        || fresh.mod_time != side.mod_time;

    *side = fresh;
    Ok(changed)
}

/// Stat `path`, treating a vanished entry, a parent-became-a-file, and any
/// non-regular/non-directory entry as absent.
fn stat_path(path: &Path) -> Result<PathInfo, SyncError> {
    use std::io::ErrorKind;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e)
            if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::NotADirectory =>
        {
            return Ok(PathInfo::absent())
        }
        Err(e) => return Err(SyncError::Io(e)),
    };

    let file_type = metadata.file_type();
    if file_type.is_dir() {
        return Ok(PathInfo::dir(path.to_path_buf()));
    }
    if !file_type.is_file() {
        // Symlinks and other non-regular entries are reported as absent.
        return Ok(PathInfo::absent());
    }

    let mod_time: SystemTime = metadata
        .modified()
        .map_err(SyncError::Io)?;
    Ok(PathInfo::file(path.to_path_buf(), metadata.len(), mod_time))
}

fn execute(
    kind: OperationKind,
    src_path: &Path,
    copy_path: &Path,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    match kind {
        OperationKind::CopyFile | OperationKind::ReplaceFile => {
            ops::copy_file(src_path, copy_path, cancel)
        }
        OperationKind::CopyDir => ops::ensure_dir(copy_path),
        OperationKind::RemoveFile | OperationKind::RemoveDir => ops::remove_path(copy_path),
        OperationKind::ReplaceDirWithFile => {
            ops::remove_path(copy_path)?;
            ops::copy_file(src_path, copy_path, cancel)
        }
        OperationKind::None => unreachable!("scheduler never enqueues a None-kind operation"),
    }
}
