//! Controller - owns the index, the queue, the pool; drives the periodic
//! scan loop; handles shutdown and the consecutive-error budget.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::executor::Executor;
use crate::index::EntriesIndex;
use crate::scanner::{scan_once, ScanOutcome};
use crate::scheduler::{ScheduleOutcome, Scheduler};
use crate::types::SyncError;

/// Cycle errors stop counting toward the three-strike budget; this is the
/// number of consecutive cycle-structural failures that trigger a fatal
/// shutdown. Per-task execution errors never count here — they're
/// rediscovered and retried on the next cycle.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// The bounded task queue's fixed capacity.
const QUEUE_CAPACITY: usize = 100;

pub struct Controller {
    settings: Settings,
    index: Arc<EntriesIndex>,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(settings: Settings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            index: Arc::new(EntriesIndex::new()),
            cancel,
        }
    }

    /// Returns only the most critical errors that make further work
    /// impossible; a graceful shutdown (external cancellation) returns `Ok`.
    pub async fn run(&self) -> Result<(), SyncError> {
        let (queue_tx, queue_rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);

        let executor = Executor::new(
            Arc::clone(&self.index),
            self.settings.source.clone(),
            self.settings.destination.clone(),
            self.settings.include_empty_dirs,
            self.settings.scan_period,
            self.settings.workers,
        );
        let executor_handle = executor.start(queue_rx, self.cancel.clone());

        let scheduler = Scheduler::new(
            Arc::clone(&self.index),
            queue_tx,
            self.settings.include_empty_dirs,
            self.settings.scan_period,
        );

        let result = if self.settings.once {
            self.run_once(&scheduler).await
        } else {
            self.run_periodic(&scheduler).await
        };

        // Drop the scheduler (and its queue sender) before closing the
        // executor so in-flight workers observe the channel closing rather
        // than blocking forever on a send that will never be answered.
        drop(scheduler);
        executor_handle.stop().await;

        result
    }

    async fn run_once(&self, scheduler: &Scheduler) -> Result<(), SyncError> {
        self.run_cycle(scheduler, true).await?;
        Ok(())
    }

    async fn run_periodic(&self, scheduler: &Scheduler) -> Result<(), SyncError> {
        let mut ticker = tokio::time::interval(self.settings.scan_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_errors: u32 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    match self.run_cycle(scheduler, false).await {
                        Ok(()) => {
                            consecutive_errors = consecutive_errors.saturating_sub(1);
                        }
                        Err(err) if self.cancel.is_cancelled() => {
                            let _ = err;
                            return Ok(());
                        }
                        Err(err) if err.counts_toward_error_budget() => {
                            consecutive_errors += 1;
                            tracing::error!(error = %err, consecutive_errors, "cycle failed");
                            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                                return Err(err);
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "non-fatal cycle error");
                        }
                    }
                }
            }
        }
    }

    /// One `scan → schedule` pass, with a panic-to-error boundary so a panic
    /// here never crashes the process.
    async fn run_cycle(&self, scheduler: &Scheduler, once: bool) -> Result<(), SyncError> {
        let index = Arc::clone(&self.index);
        let src = self.settings.source.clone();
        let dst = self.settings.destination.clone();
        let include_hidden = self.settings.include_hidden;
        let include_empty_dirs = self.settings.include_empty_dirs;
        let cancel = self.cancel.clone();

        let scan_outcome = scan_once(index, src, dst, include_hidden, include_empty_dirs, cancel.clone())
            .await?;

        if scan_outcome == ScanOutcome::Canceled {
            return Ok(());
        }

        match scheduler.schedule_once(once, &cancel).await? {
            ScheduleOutcome::Completed | ScheduleOutcome::Canceled => Ok(()),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Races the controller's run loop against an external shutdown signal.
///
/// `controller.run()` is driven through a dedicated task so a panic inside it
/// surfaces as a `JoinError` here instead of unwinding past this function;
/// either way it's converted into a fatal return value rather than crashing
/// the process.
pub async fn run_guarded(settings: Settings) -> Result<(), SyncError> {
    let cancel = CancellationToken::new();
    let controller = Arc::new(Controller::new(settings, cancel.clone()));
    let run_handle = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    let shutdown = crate::signals::wait_for_shutdown_signal();
    tokio::pin!(shutdown);
    tokio::pin!(run_handle);

    tokio::select! {
        joined = &mut run_handle => match joined {
            Ok(result) => result,
            Err(join_err) => Err(SyncError::Fatal(format!("controller panicked: {join_err}"))),
        },
        _ = &mut shutdown => {
            cancel.cancel();
            // The controller's own loops already select on the same token,
            // so this resolves promptly once it observes cancellation.
            match run_handle.await {
                Ok(result) => result,
                Err(join_err) => Err(SyncError::Fatal(format!("controller panicked: {join_err}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, Settings};
    use std::fs;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn settings_for(src: &std::path::Path, dst: &std::path::Path, once: bool) -> Settings {
        let cli = Cli {
            source: src.to_path_buf(),
            destination: dst.to_path_buf(),
            hidden: false,
            copydirs: false,
            log2std: true,
            once,
            pid: false,
            loglvl: "info".to_string(),
            scanperiod: 1,
            workers: Some(2),
        };
        Settings::try_from(cli).unwrap()
    }

    #[tokio::test]
    async fn once_mode_mirrors_new_files_then_exits() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(src.path().join("dir")).unwrap();
        fs::write(src.path().join("dir/b.txt"), b"world").unwrap();

        let settings = settings_for(src.path(), dst.path(), true);
        let controller = Controller::new(settings, CancellationToken::new());
        controller.run().await.unwrap();

        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dst.path().join("dir/b.txt")).unwrap(), b"world");
    }

    #[tokio::test]
    async fn once_mode_removes_stale_copy_only_files() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();
        fs::write(dst.path().join("stale.txt"), b"old").unwrap();

        let settings = settings_for(src.path(), dst.path(), true);
        let controller = Controller::new(settings, CancellationToken::new());
        controller.run().await.unwrap();

        assert!(!dst.path().join("stale.txt").exists());
        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn once_mode_is_idempotent_on_an_already_synced_tree() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();

        let settings = settings_for(src.path(), dst.path(), true);
        let controller = Controller::new(settings.clone(), CancellationToken::new());
        controller.run().await.unwrap();

        let settings2 = settings_for(src.path(), dst.path(), true);
        let controller2 = Controller::new(settings2, CancellationToken::new());
        controller2.run().await.unwrap();

        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn periodic_mode_stops_promptly_on_cancellation() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();

        let settings = settings_for(src.path(), dst.path(), false);
        let cancel = CancellationToken::new();
        let controller = Controller::new(settings, cancel.clone());

        let handle = tokio::spawn(async move { controller.run().await });
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(StdDuration::from_secs(2), handle)
            .await
            .expect("controller should stop promptly after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }
}
