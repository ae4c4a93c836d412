//! Operation - the synchronization action pending (or taken) for one path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Kind of filesystem action needed to reconcile one path, derived from the
/// `(src, copy)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CopyFile,
    CopyDir,
    RemoveFile,
    RemoveDir,
    ReplaceFile,
    ReplaceDirWithFile,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Scheduled,
    InProgress,
    Completed,
    Canceled,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Canceled | OperationStatus::Failed
        )
    }
}

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_operation_id() -> u64 {
    NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A synchronization operation in flight (or finished) for one relative path.
///
/// `cancel` is set by the executor once the operation transitions to
/// `InProgress`, and read by the scheduler under the index lock to abort
/// work that became unnecessary.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: u64,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub scheduled_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub canceled_at: Option<SystemTime>,
    pub failed_at: Option<SystemTime>,
    pub cancel: Option<CancellationToken>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: next_operation_id(),
            kind,
            status: OperationStatus::Scheduled,
            scheduled_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
            canceled_at: None,
            failed_at: None,
            cancel: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_in_progress(&mut self, cancel: CancellationToken) {
        self.status = OperationStatus::InProgress;
        self.started_at = Some(SystemTime::now());
        self.cancel = Some(cancel);
    }

    pub fn mark_canceled(&mut self) {
        self.status = OperationStatus::Canceled;
        self.canceled_at = Some(SystemTime::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = OperationStatus::Completed;
        self.completed_at = Some(SystemTime::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = OperationStatus::Failed;
        self.failed_at = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonically_unique() {
        let a = Operation::new(OperationKind::CopyFile);
        let b = Operation::new(OperationKind::CopyFile);
        assert!(b.id > a.id);
    }

    #[test]
    fn fresh_operation_is_scheduled_and_not_terminal() {
        let op = Operation::new(OperationKind::CopyFile);
        assert_eq!(op.status, OperationStatus::Scheduled);
        assert!(!op.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        let mut op = Operation::new(OperationKind::RemoveFile);
        op.mark_completed();
        assert!(op.is_terminal());

        let mut op = Operation::new(OperationKind::RemoveFile);
        op.mark_canceled();
        assert!(op.is_terminal());

        let mut op = Operation::new(OperationKind::RemoveFile);
        op.mark_failed();
        assert!(op.is_terminal());
    }

    #[test]
    fn in_progress_is_not_terminal_and_carries_a_cancel_handle() {
        let mut op = Operation::new(OperationKind::CopyFile);
        op.mark_in_progress(CancellationToken::new());
        assert!(!op.is_terminal());
        assert!(op.cancel.is_some());
    }
}
