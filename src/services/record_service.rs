use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::RecordEntity,
    dto::record::{CreateRecordRequest, RecordResponse},
    engine::resolver::{DraftSources, resolve_initial},
    error::ServiceError,
    state::SharedState,
};

/// Persist a fresh record in the `Scheduled` state.
pub async fn create_record(
    state: &SharedState,
    request: CreateRecordRequest,
) -> Result<RecordResponse, ServiceError> {
    let committed = request
        .committed_fields
        .unwrap_or_else(|| Value::Object(Map::new()));
    let record = RecordEntity::new(request.kind, committed);

    let store = state.require_record_store().await?;
    store.create_record(record.clone()).await?;
    info!(record_id = %record.id, kind = record.kind.as_key(), "record created");

    Ok(record.into())
}

/// Fetch a record with its committed fields and draft.
pub async fn get_record(state: &SharedState, id: Uuid) -> Result<RecordResponse, ServiceError> {
    Ok(load_record(state, id).await?.into())
}

/// Drop the draft of a record, along with its cached snapshots. An open
/// session restarts from the record without its draft.
pub async fn discard_draft(state: &SharedState, id: Uuid) -> Result<RecordResponse, ServiceError> {
    let record = load_record(state, id).await?;

    match state.session(id) {
        Some(session) => {
            let rebuilt = snapshot_without_draft(state, &record).await?;
            session.discard_draft(rebuilt).await?;
        }
        None => {
            let store = state.require_record_store().await?;
            store.clear_draft(id).await?;
            state.cache().evict_record(id);
        }
    }
    info!(record_id = %id, "draft discarded");

    Ok(load_record(state, id).await?.into())
}

pub(crate) async fn load_record(state: &SharedState, id: Uuid) -> Result<RecordEntity, ServiceError> {
    let store = state.require_record_store().await?;
    store
        .read_record(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("record `{id}` not found")))
}

/// Snapshot an editor falls back to once the draft is gone.
async fn snapshot_without_draft(
    state: &SharedState,
    record: &RecordEntity,
) -> Result<Value, ServiceError> {
    let store = state.require_record_store().await?;
    let assignments = store.read_assignments(record.id).await?;
    let defaults = state.config().defaults_for(record.kind);

    let resolution = resolve_initial(
        record.kind,
        record.lifecycle_state,
        DraftSources {
            draft: None,
            cached: None,
            assignments: assignments.as_ref().map(|assignments| &assignments.entries),
            committed: Some(&record.committed_fields),
            defaults: &defaults,
        },
    );
    Ok(resolution.snapshot)
}

