//! Debounced draft autosave for one record.
//!
//! A [`DebouncedPersister`] owns a background task that receives snapshots
//! and writes at most one of them per quiescence window: every accepted
//! notification restarts the timer, and only the latest snapshot is written
//! once the record has been quiet long enough. The task owns the timer, the
//! last successfully written baseline and the in-flight write, so writes for
//! one record never overlap.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::storage::StorageResult, engine::change_detector::are_equal};

/// Asynchronous draft write invoked when a debounce window expires.
pub type WriteFn = Arc<dyn Fn(Value) -> BoxFuture<'static, StorageResult<()>> + Send + Sync>;

/// Wrap an async closure into a [`WriteFn`].
pub fn write_fn<F, Fut>(write: F) -> WriteFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StorageResult<()>> + Send + 'static,
{
    Arc::new(move |snapshot| Box::pin(write(snapshot)))
}

/// Timing knobs of a persister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersisterConfig {
    /// Quiet period required before the latest snapshot is written.
    pub quiescence_window: Duration,
    /// Period after spawning during which notifications are ignored, so the
    /// initial snapshot loaded by the editor never triggers a write.
    pub grace_period: Duration,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            quiescence_window: Duration::from_millis(2_500),
            grace_period: Duration::from_millis(1_000),
        }
    }
}

/// Autosave state exposed to editors for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum AutosaveStatus {
    /// Nothing is being written and the last write (if any) succeeded.
    Idle,
    /// A draft write is in flight.
    Saving,
    /// The last draft write failed; the next edit re-arms the autosave.
    Error(String),
}

enum Command {
    Notify { snapshot: Value, enabled: bool },
    Suspend { ack: oneshot::Sender<()> },
    Resume { baseline: Option<Value> },
    ResetBaseline { snapshot: Value },
}

/// Handle to the autosave task of one record. Dropping it stops the task;
/// a pending (not yet started) write is discarded.
pub struct DebouncedPersister {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<AutosaveStatus>,
    task: JoinHandle<()>,
}

impl DebouncedPersister {
    /// Spawn the autosave task for `record_id` on the current runtime.
    pub fn spawn(record_id: Uuid, write: WriteFn, config: PersisterConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(AutosaveStatus::Idle);

        let worker = Worker {
            record_id,
            write,
            quiescence_window: config.quiescence_window,
            armed_at: Instant::now() + config.grace_period,
            baseline: None,
            pending: None,
            suspended: false,
            status: status_tx,
        };
        let task = tokio::spawn(worker.run(receiver));

        Self {
            commands,
            status,
            task,
        }
    }

    /// Report the latest snapshot of the record. Never blocks.
    ///
    /// With `enabled == false` any pending write is cancelled and nothing is
    /// scheduled. Otherwise a snapshot equal to the last written one cancels
    /// the pending write, and a different one restarts the debounce timer.
    pub fn notify(&self, snapshot: Value, enabled: bool) {
        if self
            .commands
            .send(Command::Notify { snapshot, enabled })
            .is_err()
        {
            debug!("autosave task already stopped; dropping snapshot");
        }
    }

    /// Cancel any pending write and ignore notifications until [`resume`].
    /// Resolves once no write is in flight.
    ///
    /// [`resume`]: DebouncedPersister::resume
    pub async fn suspend(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Suspend { ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Accept notifications again. A provided `baseline` replaces the last
    /// written snapshot, typically with the values an authoritative write
    /// just committed.
    pub fn resume(&self, baseline: Option<Value>) {
        let _ = self.commands.send(Command::Resume { baseline });
    }

    /// Treat `snapshot` as already persisted, e.g. after the editor reloaded
    /// it from the store.
    pub fn reset_baseline(&self, snapshot: Value) {
        let _ = self.commands.send(Command::ResetBaseline { snapshot });
    }

    /// Current autosave status.
    pub fn status(&self) -> AutosaveStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to autosave status changes.
    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.status.clone()
    }

    /// Stop accepting snapshots and wait for the task to finish any write
    /// already in flight. A pending write is discarded.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(err) = task.await {
            warn!(error = %err, "autosave task ended abnormally");
        }
    }
}

struct Pending {
    snapshot: Value,
    deadline: Instant,
}

struct Worker {
    record_id: Uuid,
    write: WriteFn,
    quiescence_window: Duration,
    armed_at: Instant,
    baseline: Option<Value>,
    pending: Option<Pending>,
    suspended: bool,
    status: watch::Sender<AutosaveStatus>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.pending.as_ref().map(|pending| pending.deadline);
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = wait_until(deadline) => self.flush().await,
            }
        }
        debug!(record_id = %self.record_id, "autosave task stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Notify { snapshot, enabled } => self.on_notify(snapshot, enabled),
            Command::Suspend { ack } => {
                self.suspended = true;
                self.cancel_pending("suspended");
                let _ = ack.send(());
            }
            Command::Resume { baseline } => {
                self.suspended = false;
                if baseline.is_some() {
                    self.baseline = baseline;
                }
            }
            Command::ResetBaseline { snapshot } => {
                self.cancel_pending("baseline reset");
                self.baseline = Some(snapshot);
            }
        }
    }

    fn on_notify(&mut self, snapshot: Value, enabled: bool) {
        if !enabled || self.suspended {
            self.cancel_pending("drafting disabled");
            return;
        }

        if Instant::now() < self.armed_at {
            return;
        }

        if self
            .baseline
            .as_ref()
            .is_some_and(|baseline| are_equal(baseline, &snapshot))
        {
            self.cancel_pending("snapshot matches last write");
            return;
        }

        self.pending = Some(Pending {
            snapshot,
            deadline: Instant::now() + self.quiescence_window,
        });
    }

    fn cancel_pending(&mut self, reason: &'static str) {
        if self.pending.take().is_some() {
            debug!(record_id = %self.record_id, reason, "pending draft write cancelled");
        }
    }

    async fn flush(&mut self) {
        let Some(Pending { snapshot, .. }) = self.pending.take() else {
            return;
        };

        self.status.send_replace(AutosaveStatus::Saving);
        match (self.write)(snapshot.clone()).await {
            Ok(()) => {
                debug!(record_id = %self.record_id, "draft saved");
                self.baseline = Some(snapshot);
                self.status.send_replace(AutosaveStatus::Idle);
            }
            Err(err) => {
                warn!(record_id = %self.record_id, error = %err, "draft autosave failed");
                self.status.send_replace(AutosaveStatus::Error(err.to_string()));
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::dao::storage::StorageError;

    type Log = Arc<Mutex<Vec<Value>>>;

    fn recording_writer() -> (WriteFn, Log) {
        let log: Log = Arc::default();
        let sink = log.clone();
        let write = write_fn(move |snapshot| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(snapshot);
                Ok(())
            }
        });
        (write, log)
    }

    fn writes(log: &Log) -> Vec<Value> {
        log.lock().unwrap().clone()
    }

    /// Spawn a persister and wait out its grace period.
    async fn armed(write: WriteFn) -> DebouncedPersister {
        let persister = DebouncedPersister::spawn(Uuid::new_v4(), write, PersisterConfig::default());
        sleep(Duration::from_millis(1_001)).await;
        persister
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_coalesce_into_one_write_of_the_last_value() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        for n in 1..=5 {
            persister.notify(json!({ "notes": format!("Change {n}") }), true);
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_millis(2_500)).await;

        assert_eq!(writes(&log), vec![json!({"notes": "Change 5"})]);
        assert_eq!(persister.status(), AutosaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn write_waits_for_a_full_quiet_window() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "a"}), true);
        sleep(Duration::from_millis(2_000)).await;
        persister.notify(json!({"notes": "ab"}), true);
        sleep(Duration::from_millis(2_000)).await;
        assert!(writes(&log).is_empty());

        sleep(Duration::from_millis(600)).await;
        assert_eq!(writes(&log), vec![json!({"notes": "ab"})]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_snapshot_is_not_written_twice() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"lineup": {"gk": "p1"}}), true);
        sleep(Duration::from_secs(3)).await;
        persister.notify(json!({"lineup": {"gk": "p1"}}), true);
        sleep(Duration::from_secs(3)).await;
        persister.notify(json!({"lineup": {"gk": "p1"}}), true);
        sleep(Duration::from_secs(3)).await;

        assert_eq!(writes(&log).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_to_the_saved_value_cancels_the_pending_write() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "saved"}), true);
        sleep(Duration::from_secs(3)).await;
        persister.notify(json!({"notes": "typo"}), true);
        sleep(Duration::from_millis(500)).await;
        persister.notify(json!({"notes": "saved"}), true);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(writes(&log), vec![json!({"notes": "saved"})]);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_notifications_never_write() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "x"}), false);
        sleep(Duration::from_secs(60)).await;

        persister.notify(json!({"notes": "y"}), true);
        sleep(Duration::from_millis(1_000)).await;
        persister.notify(json!({"notes": "y"}), false);
        sleep(Duration::from_secs(60)).await;

        assert!(writes(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_during_grace_period_are_ignored() {
        let (write, log) = recording_writer();
        let persister =
            DebouncedPersister::spawn(Uuid::new_v4(), write, PersisterConfig::default());

        persister.notify(json!({"formation": "2-3-1"}), true);
        sleep(Duration::from_secs(10)).await;
        assert!(writes(&log).is_empty());

        persister.notify(json!({"formation": "3-2-1"}), true);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(writes(&log), vec![json!({"formation": "3-2-1"})]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_surfaces_error_and_is_not_retried_until_next_change() {
        let attempts: Log = Arc::default();
        let sink = attempts.clone();
        let write = write_fn(move |snapshot| {
            let sink = sink.clone();
            async move {
                let mut attempts = sink.lock().unwrap();
                attempts.push(snapshot);
                if attempts.len() == 1 {
                    Err(StorageError::NotFound { id: Uuid::nil() })
                } else {
                    Ok(())
                }
            }
        });
        let persister = armed(write).await;

        persister.notify(json!({"notes": "first"}), true);
        sleep(Duration::from_secs(3)).await;
        assert!(matches!(persister.status(), AutosaveStatus::Error(_)));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(writes(&attempts).len(), 1);

        persister.notify(json!({"notes": "first"}), true);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(writes(&attempts).len(), 2);
        assert_eq!(persister.status(), AutosaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_baseline_suppresses_write_of_that_snapshot() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.reset_baseline(json!({"notes": "loaded"}));
        persister.notify(json!({"notes": "loaded"}), true);
        sleep(Duration::from_secs(5)).await;

        assert!(writes(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_discards_pending_write() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "unsaved"}), true);
        sleep(Duration::from_millis(500)).await;
        drop(persister);
        sleep(Duration::from_secs(10)).await;

        assert!(writes(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_pending_write() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "unsaved"}), true);
        persister.shutdown().await;
        sleep(Duration::from_secs(10)).await;

        assert!(writes(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_persister_ignores_enabled_notifications_until_resumed() {
        let (write, log) = recording_writer();
        let persister = armed(write).await;

        persister.notify(json!({"notes": "before"}), true);
        persister.suspend().await;
        persister.notify(json!({"notes": "during"}), true);
        sleep(Duration::from_secs(10)).await;
        assert!(writes(&log).is_empty());

        persister.resume(Some(json!({"notes": "committed"})));
        persister.notify(json!({"notes": "committed"}), true);
        sleep(Duration::from_secs(3)).await;
        assert!(writes(&log).is_empty());

        persister.notify(json!({"notes": "after"}), true);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(writes(&log), vec![json!({"notes": "after"})]);
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_waits_for_in_flight_write() {
        let log: Log = Arc::default();
        let sink = log.clone();
        let write = write_fn(move |snapshot| {
            let sink = sink.clone();
            async move {
                sleep(Duration::from_secs(1)).await;
                sink.lock().unwrap().push(snapshot);
                Ok(())
            }
        });
        let persister = armed(write).await;

        persister.notify(json!({"notes": "slow"}), true);
        sleep(Duration::from_millis(2_600)).await;
        assert_eq!(persister.status(), AutosaveStatus::Saving);

        persister.suspend().await;
        assert_eq!(writes(&log).len(), 1);
        assert_eq!(persister.status(), AutosaveStatus::Idle);
    }
}
