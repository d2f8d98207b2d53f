use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, watch};
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{AssignmentsEntity, RecordEntity},
    engine::{
        cache::FallbackCache,
        persister::AutosaveStatus,
        resolver::{DraftSources, Resolution, ResolvedFrom, resolve_initial},
    },
    error::ServiceError,
    state::{
        AppState,
        coordinator::LifecycleCoordinator,
        guards::guard_for,
        lifecycle::{LifecycleEvent, Snapshot},
    },
};

/// Editing context of one mounted editor: the snapshot it currently holds,
/// its autosave loop and the lifecycle coordinator of the record.
pub struct EditingSession {
    context_id: String,
    current: RwLock<Value>,
    coordinator: LifecycleCoordinator,
    cache: Arc<FallbackCache>,
}

impl EditingSession {
    /// Resolve the initial snapshot of `record` and start its autosave loop.
    pub fn open(
        state: &AppState,
        record: &RecordEntity,
        assignments: Option<&AssignmentsEntity>,
        context_id: String,
    ) -> (Self, Resolution) {
        let config = state.config();
        let defaults = config.defaults_for(record.kind);
        let cached = state
            .cache()
            .get(record.id, &context_id)
            .map(|entry| entry.fields);

        let resolution = resolve_initial(
            record.kind,
            record.lifecycle_state,
            DraftSources {
                draft: record.draft.as_ref(),
                cached: cached.as_ref(),
                assignments: assignments.map(|assignments| &assignments.entries),
                committed: Some(&record.committed_fields),
                defaults: &defaults,
            },
        );
        debug!(
            record_id = %record.id,
            context_id = %context_id,
            source = ?resolution.source,
            "editing session resolved"
        );

        let coordinator = LifecycleCoordinator::new(
            record,
            state.store_slot(),
            guard_for(record.kind),
            config.engine(),
        );
        // A cache entry may hold edits that never reached the store, so it is
        // not treated as written.
        if resolution.source != ResolvedFrom::Cache {
            coordinator
                .persister()
                .reset_baseline(resolution.snapshot.clone());
        }

        let session = Self {
            context_id,
            current: RwLock::new(resolution.snapshot.clone()),
            coordinator,
            cache: state.cache_handle(),
        };
        (session, resolution)
    }

    pub fn record_id(&self) -> Uuid {
        self.coordinator.record_id()
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub async fn current(&self) -> Value {
        self.current.read().await.clone()
    }

    pub async fn lifecycle_snapshot(&self) -> Snapshot {
        self.coordinator.snapshot().await
    }

    pub async fn drafting_enabled(&self) -> bool {
        self.coordinator.drafting_enabled().await
    }

    /// Record the editor's latest snapshot. Never waits for a write; returns
    /// whether the snapshot is eligible for autosave.
    pub async fn on_snapshot_change(&self, snapshot: Value) -> bool {
        *self.current.write().await = snapshot.clone();
        let enabled = self.coordinator.notify(snapshot.clone()).await;
        if enabled {
            self.cache.put(self.record_id(), &self.context_id, snapshot);
        }
        enabled
    }

    pub fn autosave_status(&self) -> AutosaveStatus {
        self.coordinator.autosave_status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AutosaveStatus> {
        self.coordinator.persister().subscribe()
    }

    /// Trigger a lifecycle transition with `snapshot`, or the current snapshot
    /// when none is given.
    pub async fn begin_transition(
        &self,
        event: LifecycleEvent,
        snapshot: Option<Value>,
    ) -> Result<RecordEntity, ServiceError> {
        let snapshot = match snapshot {
            Some(snapshot) => {
                *self.current.write().await = snapshot.clone();
                snapshot
            }
            None => self.current().await,
        };

        let record = self.coordinator.begin_transition(event, snapshot).await?;
        if record.draft.is_none() {
            self.cache.evict_record(record.id);
        }
        Ok(record)
    }

    /// Drop the stored draft and restart editing from `rebuilt`.
    pub async fn discard_draft(&self, rebuilt: Value) -> Result<(), ServiceError> {
        self.coordinator.discard_draft(rebuilt.clone()).await?;
        self.cache.evict_record(self.record_id());
        *self.current.write().await = rebuilt;
        Ok(())
    }

    /// Stop autosaving. A write already in flight completes first; a pending
    /// one is discarded.
    pub async fn close(&self, evict_cache: bool) {
        self.coordinator.close().await;
        if evict_cache {
            self.cache.clear(self.record_id(), &self.context_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::dao::{
        models::{LifecycleState, RecordKind},
        record_store::{RecordStore, memory::MemoryRecordStore},
    };

    async fn state_with_record(record: &RecordEntity) -> (Arc<AppState>, MemoryRecordStore) {
        let state = AppState::new();
        let store = MemoryRecordStore::new();
        store.create_record(record.clone()).await.unwrap();
        state.set_record_store(Arc::new(store.clone())).await;
        (state, store)
    }

    #[tokio::test(start_paused = true)]
    async fn open_prefers_stored_draft_over_committed_fields() {
        let mut record = RecordEntity::new(
            RecordKind::Match,
            json!({"teamSummary": {"defenseSummary": "Saved-D", "midfieldSummary": "Saved-M"}}),
        );
        record.lifecycle_state = LifecycleState::Played;
        record.draft = Some(json!({"teamSummary": {"defenseSummary": "Draft"}}));
        let (state, _) = state_with_record(&record).await;

        let (session, resolution) = EditingSession::open(&state, &record, None, "report".into());

        assert_eq!(resolution.source, ResolvedFrom::Draft);
        let current = session.current().await;
        assert_eq!(current["teamSummary"]["defenseSummary"], json!("Draft"));
        assert_eq!(current["teamSummary"]["midfieldSummary"], json!("Saved-M"));
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_snapshot_is_not_written_back() {
        let mut record = RecordEntity::new(RecordKind::Match, json!({"formation": "2-3-1"}));
        record.lifecycle_state = LifecycleState::Played;
        let (state, store) = state_with_record(&record).await;
        let (session, resolution) = EditingSession::open(&state, &record, None, "report".into());
        assert_eq!(resolution.source, ResolvedFrom::Committed);
        sleep(Duration::from_millis(1_500)).await;

        assert!(session.on_snapshot_change(resolution.snapshot.clone()).await);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(store.read_record(record.id).await.unwrap().unwrap().draft, None);

        // An edit reverted within the quiet window is not written either.
        let mut edited = resolution.snapshot.clone();
        edited["formation"] = json!("3-2-1");
        session.on_snapshot_change(edited).await;
        sleep(Duration::from_millis(500)).await;
        session.on_snapshot_change(resolution.snapshot).await;
        sleep(Duration::from_secs(3)).await;

        assert_eq!(store.read_record(record.id).await.unwrap().unwrap().draft, None);
        assert_eq!(session.autosave_status(), AutosaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_cached_and_autosaved() {
        let record = RecordEntity::new(RecordKind::TrainingPlan, json!({"drills": []}));
        let (state, store) = state_with_record(&record).await;
        let (session, _) = EditingSession::open(&state, &record, None, "plan".into());
        sleep(Duration::from_millis(1_001)).await;

        assert!(
            session
                .on_snapshot_change(json!({"drills": ["rondo"], "notes": ""}))
                .await
        );
        assert_eq!(
            state.cache().get(record.id, "plan").unwrap().fields,
            json!({"drills": ["rondo"], "notes": ""})
        );

        sleep(Duration::from_secs(3)).await;
        let stored = store.read_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.draft, Some(json!({"drills": ["rondo"], "notes": ""})));
        assert_eq!(session.autosave_status(), AutosaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_uses_current_snapshot_and_clears_cache() {
        let mut record = RecordEntity::new(RecordKind::TrainingPlan, json!({"drills": ["rondo"]}));
        record.lifecycle_state = LifecycleState::Played;
        let (state, store) = state_with_record(&record).await;
        let (session, _) = EditingSession::open(&state, &record, None, "plan".into());
        sleep(Duration::from_millis(1_001)).await;

        session
            .on_snapshot_change(json!({"drills": ["rondo"], "notes": "Good intensity"}))
            .await;
        let updated = session
            .begin_transition(LifecycleEvent::Finalize, None)
            .await
            .unwrap();

        assert_eq!(updated.lifecycle_state, LifecycleState::Done);
        assert_eq!(
            updated.committed_fields,
            json!({"drills": ["rondo"], "notes": "Good intensity"})
        );
        assert!(state.cache().get(record.id, "plan").is_none());
        assert!(!session.drafting_enabled().await);

        // Edits after the record is done are neither cached nor written.
        assert!(!session.on_snapshot_change(json!({"notes": "late"})).await);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.read_record(record.id).await.unwrap().unwrap().draft, None);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_discards_pending_write() {
        let record = RecordEntity::new(RecordKind::TrainingPlan, json!({}));
        let (state, store) = state_with_record(&record).await;
        let (session, _) = EditingSession::open(&state, &record, None, "plan".into());
        sleep(Duration::from_millis(1_001)).await;

        session.on_snapshot_change(json!({"notes": "unsaved"})).await;
        session.close(true).await;
        drop(session);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(store.read_record(record.id).await.unwrap().unwrap().draft, None);
        assert!(state.cache().is_empty());
    }
}
