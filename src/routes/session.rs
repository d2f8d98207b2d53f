use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post, put},
};
use axum_valid::Valid;
use futures::Stream;
use uuid::Uuid;

use crate::{
    dto::{
        record::RecordResponse,
        session::{
            CloseSessionQuery, MountSessionRequest, MountSessionResponse, SessionStatusResponse,
            SnapshotChangeRequest, TransitionRequest,
        },
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes driving editing sessions: mount, edits, autosave status and transitions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/records/{id}/session",
            post(mount_session).delete(close_session),
        )
        .route("/records/{id}/session/snapshot", put(change_snapshot))
        .route("/records/{id}/session/status", get(session_status))
        .route("/records/{id}/session/events", get(session_events))
        .route("/records/{id}/transitions", post(begin_transition))
}

/// Mount an editor on a record and return its initial snapshot.
#[utoipa::path(
    post,
    path = "/records/{id}/session",
    tag = "session",
    params(("id" = String, Path, description = "Identifier of the record")),
    request_body = MountSessionRequest,
    responses(
        (status = 200, description = "Session mounted", body = MountSessionResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn mount_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<MountSessionRequest>>,
) -> Result<Json<MountSessionResponse>, AppError> {
    let response = session_service::mount(&state, id, payload).await?;
    Ok(Json(response))
}

/// Unmount the editor of a record, discarding any pending draft write.
#[utoipa::path(
    delete,
    path = "/records/{id}/session",
    tag = "session",
    params(
        ("id" = String, Path, description = "Identifier of the record"),
        CloseSessionQuery
    ),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "No open session")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CloseSessionQuery>,
) -> Result<StatusCode, AppError> {
    session_service::close(&state, id, query).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report the editor's latest snapshot; autosave is debounced server-side.
#[utoipa::path(
    put,
    path = "/records/{id}/session/snapshot",
    tag = "session",
    params(("id" = String, Path, description = "Identifier of the record")),
    request_body = SnapshotChangeRequest,
    responses(
        (status = 200, description = "Snapshot accepted", body = SessionStatusResponse),
        (status = 404, description = "No open session")
    )
)]
pub async fn change_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SnapshotChangeRequest>>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let status = session_service::snapshot_change(&state, id, payload).await?;
    Ok(Json(status))
}

/// Lifecycle and autosave status of a record.
#[utoipa::path(
    get,
    path = "/records/{id}/session/status",
    tag = "session",
    params(("id" = String, Path, description = "Identifier of the record")),
    responses(
        (status = 200, description = "Current status", body = SessionStatusResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn session_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let status = session_service::status(&state, id).await?;
    Ok(Json(status))
}

/// Stream autosave status changes of the open session as server-sent events.
#[utoipa::path(
    get,
    path = "/records/{id}/session/events",
    tag = "session",
    params(("id" = String, Path, description = "Identifier of the record")),
    responses(
        (status = 200, description = "SSE stream of `autosave` events", body = String, content_type = "text/event-stream"),
        (status = 404, description = "No open session")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    Ok(session_service::autosave_events(&state, id)?)
}

/// Run a lifecycle transition; its final write supersedes any pending draft.
#[utoipa::path(
    post,
    path = "/records/{id}/transitions",
    tag = "session",
    params(("id" = String, Path, description = "Identifier of the record")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Transition applied", body = RecordResponse),
        (status = 400, description = "Snapshot rejected by the transition guard"),
        (status = 404, description = "No open session"),
        (status = 409, description = "Transition not allowed from the current state"),
        (status = 503, description = "Storage unavailable or transition timed out")
    )
)]
pub async fn begin_transition(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<TransitionRequest>>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = session_service::transition(&state, id, payload).await?;
    Ok(Json(record))
}
