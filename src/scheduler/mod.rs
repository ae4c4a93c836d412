//! Scheduler and Task - diffs the index, enqueues tasks, cancels obsoleted
//! in-flight operations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::index::EntriesIndex;
use crate::types::{EntryInfo, Operation, OperationKind, OperationStatus, SyncError};

/// Whether a schedule pass ran to completion or was cut short by
/// cancellation — not an error in itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Completed,
    Canceled,
}

/// The hand-off from Scheduler to Executor.
///
/// `ready` is signaled by the Scheduler only after `entry` has been recorded
/// in the index, forbidding the Executor from racing ahead of the index
/// update.
pub struct Task {
    pub path: String,
    pub entry: EntryInfo,
    pub(crate) ready: oneshot::Receiver<()>,
}

impl Task {
    pub(crate) fn new(path: String, entry: EntryInfo) -> (Task, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Task {
                path,
                entry,
                ready: rx,
            },
            tx,
        )
    }
}

pub struct Scheduler {
    index: Arc<EntriesIndex>,
    queue_tx: mpsc::Sender<Task>,
    include_empty_dirs: bool,
    scan_period: Duration,
}

impl Scheduler {
    pub fn new(
        index: Arc<EntriesIndex>,
        queue_tx: mpsc::Sender<Task>,
        include_empty_dirs: bool,
        scan_period: Duration,
    ) -> Self {
        Self {
            index,
            queue_tx,
            include_empty_dirs,
            scan_period,
        }
    }

    /// Run one scheduling pass after the scanner has populated the index.
    pub async fn schedule_once(
        &self,
        once: bool,
        cancel: &CancellationToken,
    ) -> Result<ScheduleOutcome, SyncError> {
        let staged = self.stage_tasks()?;

        let wait_budget = if once {
            self.scan_period * 1000
        } else {
            self.scan_period
        };

        for (path, mut entry) in staged {
            if cancel.is_cancelled() {
                return Ok(ScheduleOutcome::Canceled);
            }

            let kind = entry.resolve_operation_kind();
            if kind == OperationKind::None {
                continue;
            }
            if kind == OperationKind::CopyDir && !self.include_empty_dirs {
                continue;
            }

            let operation = Operation::new(kind);
            entry.op = Some(operation.clone());

            let (task, ready_tx) = Task::new(path.clone(), entry);

            match tokio::time::timeout(wait_budget, self.queue_tx.send(task)).await {
                Err(_elapsed) => {
                    return if once {
                        Err(SyncError::Deadline(format!(
                            "scheduler enqueue wait exceeded {:?} for {}",
                            wait_budget, path
                        )))
                    } else {
                        Ok(ScheduleOutcome::Completed)
                    };
                }
                Ok(Err(_send_err)) => {
                    return Err(SyncError::Fatal("task queue closed".to_string()));
                }
                Ok(Ok(())) => {
                    self.index.update(&path, |e| e.op = Some(operation.clone()));
                    let _ = ready_tx.send(());
                }
            }
        }

        if cancel.is_cancelled() {
            Ok(ScheduleOutcome::Canceled)
        } else {
            Ok(ScheduleOutcome::Completed)
        }
    }

    /// Phase A: under the index lock, clear terminal operations, stage fresh
    /// tasks, and cancel in-progress operations whose target is no longer
    /// divergent.
    fn stage_tasks(&self) -> Result<Vec<(String, EntryInfo)>, SyncError> {
        let mut staged = Vec::new();
        self.index.for_each::<std::convert::Infallible>(|key, entry| {
            if let Some(op) = entry.op.clone() {
                if op.is_terminal() {
                    entry.op = None;
                    return Ok(());
                }
            }

            if entry.requires_sync() {
                if entry.op.is_none() {
                    staged.push((key.to_string(), entry.clone()));
                }
            } else if let Some(op) = &entry.op {
                if op.status == OperationStatus::InProgress {
                    if let Some(cancel_handle) = &op.cancel {
                        cancel_handle.cancel();
                    }
                }
            }

            Ok(())
        })
        .unwrap();
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathInfo;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn index_with_pending_copy() -> Arc<EntriesIndex> {
        let index = Arc::new(EntriesIndex::new());
        index.update("a.txt", |entry| {
            entry.src = PathInfo::file(PathBuf::from("/src/a.txt"), 5, SystemTime::UNIX_EPOCH);
        });
        index
    }

    #[tokio::test]
    async fn stages_and_enqueues_a_copy_file_task() {
        let index = index_with_pending_copy();
        let (tx, mut rx) = mpsc::channel(10);
        let scheduler = Scheduler::new(Arc::clone(&index), tx, false, Duration::from_secs(1));

        let outcome = scheduler
            .schedule_once(false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Completed);

        let task = rx.try_recv().unwrap();
        assert_eq!(task.path, "a.txt");
        assert_eq!(task.entry.resolve_operation_kind(), OperationKind::CopyFile);

        let stamped = index.get("a.txt").unwrap();
        assert!(stamped.op.is_some());
    }

    #[tokio::test]
    async fn skips_entries_that_do_not_require_sync() {
        let index = Arc::new(EntriesIndex::new());
        index.update("same.txt", |entry| {
            let info = PathInfo::file(PathBuf::from("/x"), 1, SystemTime::UNIX_EPOCH);
            entry.src = info.clone();
            entry.copy = info;
        });
        let (tx, mut rx) = mpsc::channel(10);
        let scheduler = Scheduler::new(Arc::clone(&index), tx, false, Duration::from_secs(1));

        scheduler
            .schedule_once(false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn skips_copy_dir_when_empty_dirs_disabled() {
        let index = Arc::new(EntriesIndex::new());
        index.update("dir", |entry| {
            entry.src = PathInfo::dir(PathBuf::from("/src/dir"));
        });
        let (tx, mut rx) = mpsc::channel(10);
        let scheduler = Scheduler::new(Arc::clone(&index), tx, false, Duration::from_secs(1));

        scheduler
            .schedule_once(false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn clears_terminal_operations() {
        let index = Arc::new(EntriesIndex::new());
        index.update("done.txt", |entry| {
            let mut op = Operation::new(OperationKind::CopyFile);
            op.mark_completed();
            entry.op = Some(op);
        });
        let (tx, _rx) = mpsc::channel(10);
        let scheduler = Scheduler::new(Arc::clone(&index), tx, false, Duration::from_secs(1));

        scheduler
            .schedule_once(false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(index.get("done.txt").unwrap().op.is_none());
    }

    #[tokio::test]
    async fn cancels_in_progress_op_when_sync_no_longer_required() {
        let index = Arc::new(EntriesIndex::new());
        let cancel_handle = CancellationToken::new();
        index.update("settled.txt", |entry| {
            let info = PathInfo::file(PathBuf::from("/x"), 1, SystemTime::UNIX_EPOCH);
            entry.src = info.clone();
            entry.copy = info;
            let mut op = Operation::new(OperationKind::CopyFile);
            op.mark_in_progress(cancel_handle.clone());
            entry.op = Some(op);
        });
        let (tx, _rx) = mpsc::channel(10);
        let scheduler = Scheduler::new(Arc::clone(&index), tx, false, Duration::from_secs(1));

        scheduler
            .schedule_once(false, &CancellationToken::new())
            .await
            .unwrap();

        assert!(cancel_handle.is_cancelled());
    }

    #[tokio::test]
    async fn once_mode_reports_deadline_when_queue_stays_full() {
        let index = index_with_pending_copy();
        let (tx, _rx) = mpsc::channel(1);
        // Fill the queue's one slot and never drain it.
        let (filler_task, _filler_ready) = Task::new("filler".to_string(), EntryInfo::default());
        tx.try_send(filler_task).unwrap();

        let scheduler = Scheduler::new(index, tx, false, Duration::from_millis(50));
        let result = scheduler
            .schedule_once(true, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SyncError::Deadline(_))));
    }
}
