//! Arbitration between the autosave loop of a record and its authoritative
//! lifecycle writes.
//!
//! The coordinator owns the record's [`RecordLifecycle`] and its
//! [`DebouncedPersister`]. A transition holds the transition gate for its
//! whole duration; while its plan is pending the record is *finalizing*, so
//! every notification reaches the persister with `enabled == false` and the
//! persister itself is suspended after any in-flight draft write completed.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{
    sync::{Mutex, RwLock},
    time::timeout,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    dao::{
        models::{LifecycleState, RecordEntity, RecordKind},
        storage::StorageError,
    },
    engine::persister::{AutosaveStatus, DebouncedPersister, write_fn},
    error::ServiceError,
    state::{
        StoreSlot,
        guards::TransitionGuard,
        lifecycle::{LifecycleEvent, Plan, RecordLifecycle, Snapshot},
    },
};

/// Lifecycle and autosave arbitration for one record.
pub struct LifecycleCoordinator {
    record_id: Uuid,
    kind: RecordKind,
    machine: RwLock<RecordLifecycle>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
    persister: DebouncedPersister,
    guard: Arc<dyn TransitionGuard>,
    store: StoreSlot,
}

impl LifecycleCoordinator {
    /// Start coordinating `record`, spawning its autosave task.
    pub fn new(
        record: &RecordEntity,
        store: StoreSlot,
        guard: Arc<dyn TransitionGuard>,
        engine: EngineConfig,
    ) -> Self {
        let record_id = record.id;
        let drafts = store.clone();
        let write = write_fn(move |snapshot| {
            let drafts = drafts.clone();
            async move {
                let store = drafts.current().await.ok_or(StorageError::Degraded)?;
                store.write_draft(record_id, snapshot).await
            }
        });

        Self {
            record_id,
            kind: record.kind,
            machine: RwLock::new(RecordLifecycle::new(record.lifecycle_state)),
            transition_gate: Mutex::new(()),
            transition_timeout: engine.transition_timeout,
            persister: DebouncedPersister::spawn(record_id, write, engine.persister()),
            guard,
            store,
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub async fn state(&self) -> LifecycleState {
        self.machine.read().await.state()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.machine.read().await.snapshot()
    }

    /// Whether edits are currently autosaved as a draft.
    pub async fn drafting_enabled(&self) -> bool {
        let machine = self.machine.read().await;
        Self::drafting_allowed(self.kind, &machine)
    }

    fn drafting_allowed(kind: RecordKind, machine: &RecordLifecycle) -> bool {
        !machine.is_finalizing() && kind.allows_drafting(machine.state())
    }

    /// Forward a snapshot to the persister, gated by the lifecycle. Returns
    /// whether drafting was enabled for it.
    pub async fn notify(&self, snapshot: Value) -> bool {
        // The read guard is held while sending so a transition cannot be
        // planned between computing the gate and queueing the notification.
        let machine = self.machine.read().await;
        let enabled = Self::drafting_allowed(self.kind, &machine);
        self.persister.notify(snapshot, enabled);
        enabled
    }

    pub fn autosave_status(&self) -> AutosaveStatus {
        self.persister.status()
    }

    pub fn persister(&self) -> &DebouncedPersister {
        &self.persister
    }

    /// Run the transition triggered by `event` with `snapshot` as the fields
    /// being finalized, returning the record as written.
    ///
    /// The guard runs before anything is written. On any failure the plan is
    /// aborted, the state is left unchanged and drafting resumes.
    pub async fn begin_transition(
        &self,
        event: LifecycleEvent,
        snapshot: Value,
    ) -> Result<RecordEntity, ServiceError> {
        let gate = self.transition_gate.lock().await;
        let plan = self.machine.write().await.plan(event)?;

        let work = self.finalize(&plan, snapshot);
        let outcome = match self.transition_timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout),
            },
            None => work.await,
        };

        match outcome {
            Ok((record, baseline)) => {
                let applied = self.machine.write().await.apply(plan.id);
                let next = match applied {
                    Ok(next) => next,
                    Err(apply_err) => {
                        self.persister.resume(None);
                        return Err(apply_err.into());
                    }
                };
                self.persister.resume(baseline);
                drop(gate);
                info!(
                    record_id = %self.record_id,
                    event = ?event,
                    state = next.as_str(),
                    "lifecycle transition applied"
                );
                Ok(record)
            }
            Err(err) => {
                let stored = match &err {
                    ServiceError::StaleState { actual, .. } => Some(*actual),
                    // The dropped write may still have committed.
                    ServiceError::Timeout => self.stored_state().await,
                    _ => None,
                };
                {
                    let mut machine = self.machine.write().await;
                    if let Err(abort_err) = machine.abort(plan.id) {
                        warn!(
                            record_id = %self.record_id,
                            event = ?event,
                            plan_id = %plan.id,
                            error = ?abort_err,
                            "failed to abort transition"
                        );
                    }
                    if let Some(state) = stored {
                        machine.resync(state);
                    }
                }
                self.persister.resume(None);
                drop(gate);
                warn!(
                    record_id = %self.record_id,
                    event = ?event,
                    error = %err,
                    "lifecycle transition failed"
                );
                Err(err)
            }
        }
    }

    /// Lifecycle state currently held by the store, if it can be read.
    async fn stored_state(&self) -> Option<LifecycleState> {
        let store = self.store.current().await?;
        match store.read_record(self.record_id).await {
            Ok(record) => record.map(|record| record.lifecycle_state),
            Err(err) => {
                warn!(
                    record_id = %self.record_id,
                    error = %err,
                    "failed to re-read record after transition timeout"
                );
                None
            }
        }
    }

    async fn finalize(
        &self,
        plan: &Plan,
        snapshot: Value,
    ) -> Result<(RecordEntity, Option<Value>), ServiceError> {
        self.persister.suspend().await;

        let commit = self.guard.check(plan.event, &snapshot)?;
        let baseline = commit.committed_fields.clone();
        let store = self.store.current().await.ok_or(ServiceError::Degraded)?;
        let record = store
            .write_final(self.record_id, commit.into_final_write(plan.from, plan.to))
            .await?;

        Ok((record, baseline))
    }

    /// Drop the stored draft. Excludes transitions for its duration; the
    /// autosave restarts from `baseline`.
    pub async fn discard_draft(&self, baseline: Value) -> Result<(), ServiceError> {
        let _gate = self.transition_gate.lock().await;
        self.persister.suspend().await;

        let result = match self.store.current().await {
            Some(store) => store.clear_draft(self.record_id).await.map_err(Into::into),
            None => Err(ServiceError::Degraded),
        };

        match &result {
            Ok(()) => self.persister.resume(Some(baseline)),
            Err(_) => self.persister.resume(None),
        }
        result
    }

    /// Stop autosaving. Waits for a running transition to settle and for an
    /// in-flight draft write to land.
    pub async fn close(&self) {
        let _gate = self.transition_gate.lock().await;
        self.persister.suspend().await;
    }
}
