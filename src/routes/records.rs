use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::record::{CreateRecordRequest, RecordResponse},
    error::AppError,
    services::record_service,
    state::SharedState,
};

/// Routes handling record creation, lookup and draft discard.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/records", post(create_record))
        .route("/records/{id}", get(get_record))
        .route("/records/{id}/draft", delete(discard_draft))
}

/// Create a match or training plan record in the `scheduled` state.
#[utoipa::path(
    post,
    path = "/records",
    tag = "records",
    request_body = CreateRecordRequest,
    responses(
        (status = 200, description = "Record created", body = RecordResponse),
        (status = 400, description = "Invalid committed fields"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_record(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRecordRequest>>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = record_service::create_record(&state, payload).await?;
    Ok(Json(record))
}

/// Fetch a record with its committed fields and stored draft.
#[utoipa::path(
    get,
    path = "/records/{id}",
    tag = "records",
    params(("id" = String, Path, description = "Identifier of the record")),
    responses(
        (status = 200, description = "Record found", body = RecordResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn get_record(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = record_service::get_record(&state, id).await?;
    Ok(Json(record))
}

/// Drop the stored draft of a record and its cached snapshots.
#[utoipa::path(
    delete,
    path = "/records/{id}/draft",
    tag = "records",
    params(("id" = String, Path, description = "Identifier of the record")),
    responses(
        (status = 200, description = "Draft discarded", body = RecordResponse),
        (status = 404, description = "Unknown record")
    )
)]
pub async fn discard_draft(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = record_service::discard_draft(&state, id).await?;
    Ok(Json(record))
}
