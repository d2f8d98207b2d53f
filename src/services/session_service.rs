use std::{convert::Infallible, sync::Arc};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        record::RecordResponse,
        session::{
            CloseSessionQuery, MountSessionRequest, MountSessionResponse, SessionStatusResponse,
            SnapshotChangeRequest, TransitionRequest,
        },
    },
    engine::persister::AutosaveStatus,
    error::ServiceError,
    services::record_service::load_record,
    state::{SharedState, session::EditingSession},
};

const AUTOSAVE_EVENT: &str = "autosave";

/// Mount an editor on a record: resolve its initial snapshot and start autosaving.
///
/// A session already open on the record is closed first, letting its
/// in-flight draft write land before the record is read again.
pub async fn mount(
    state: &SharedState,
    id: Uuid,
    request: MountSessionRequest,
) -> Result<MountSessionResponse, ServiceError> {
    if let Some((_, previous)) = state.sessions().remove(&id) {
        debug!(record_id = %id, context_id = previous.context_id(), "replacing open session");
        previous.close(false).await;
    }

    let record = load_record(state, id).await?;
    let store = state.require_record_store().await?;
    let assignments = store.read_assignments(id).await?;

    let (session, resolution) =
        EditingSession::open(state, &record, assignments.as_ref(), request.context_id);
    let session = Arc::new(session);
    let drafting_enabled = session.drafting_enabled().await;
    state.sessions().insert(id, session.clone());

    info!(
        record_id = %id,
        context_id = session.context_id(),
        source = ?resolution.source,
        "editing session mounted"
    );

    Ok(MountSessionResponse {
        record_id: id,
        context_id: session.context_id().to_owned(),
        lifecycle_state: record.lifecycle_state,
        drafting_enabled,
        resolved_from: resolution.source,
        snapshot: resolution.snapshot,
    })
}

/// Unmount the editor of a record. A pending draft write is discarded.
pub async fn close(
    state: &SharedState,
    id: Uuid,
    query: CloseSessionQuery,
) -> Result<(), ServiceError> {
    let Some((_, session)) = state.sessions().remove(&id) else {
        return Err(no_session(id));
    };
    session.close(query.evict_cache).await;
    info!(record_id = %id, evict_cache = query.evict_cache, "editing session closed");
    Ok(())
}

/// Hand the editor's latest snapshot to the autosave loop.
pub async fn snapshot_change(
    state: &SharedState,
    id: Uuid,
    request: SnapshotChangeRequest,
) -> Result<SessionStatusResponse, ServiceError> {
    let session = require_session(state, id)?;
    session.on_snapshot_change(request.snapshot).await;
    Ok(session_status(&session).await)
}

/// Autosave and lifecycle status of a record, whether or not an editor is mounted.
pub async fn status(state: &SharedState, id: Uuid) -> Result<SessionStatusResponse, ServiceError> {
    if let Some(session) = state.session(id) {
        return Ok(session_status(&session).await);
    }

    let record = load_record(state, id).await?;
    Ok(SessionStatusResponse {
        record_id: id,
        lifecycle_state: record.lifecycle_state,
        finalizing: false,
        drafting_enabled: record.kind.allows_drafting(record.lifecycle_state),
        autosave: AutosaveStatus::Idle,
        context_id: None,
    })
}

/// Run a lifecycle transition through the record's open session.
pub async fn transition(
    state: &SharedState,
    id: Uuid,
    request: TransitionRequest,
) -> Result<RecordResponse, ServiceError> {
    let session = require_session(state, id)?;
    let record = session
        .begin_transition(request.event, request.snapshot)
        .await?;
    Ok(record.into())
}

/// Stream autosave status changes of a record's open session as SSE.
pub fn autosave_events(
    state: &SharedState,
    id: Uuid,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let session = require_session(state, id)?;
    let stream = WatchStream::new(session.subscribe_status()).map(|status| {
        let event = Event::default()
            .event(AUTOSAVE_EVENT)
            .json_data(&status)
            .unwrap_or_else(|err| {
                warn!(error = %err, "failed to encode autosave status");
                Event::default().event(AUTOSAVE_EVENT).data("{}")
            });
        Ok::<_, Infallible>(event)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn session_status(session: &EditingSession) -> SessionStatusResponse {
    let snapshot = session.lifecycle_snapshot().await;
    SessionStatusResponse {
        record_id: session.record_id(),
        lifecycle_state: snapshot.state,
        finalizing: snapshot.pending.is_some(),
        drafting_enabled: session.drafting_enabled().await,
        autosave: session.autosave_status(),
        context_id: Some(session.context_id().to_owned()),
    }
}

fn require_session(state: &SharedState, id: Uuid) -> Result<Arc<EditingSession>, ServiceError> {
    state.session(id).ok_or_else(|| no_session(id))
}

fn no_session(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("no editing session open for record `{id}`"))
}
