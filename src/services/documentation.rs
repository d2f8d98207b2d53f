use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI document covering records, editing sessions and health.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::records::create_record,
        crate::routes::records::get_record,
        crate::routes::records::discard_draft,
        crate::routes::session::mount_session,
        crate::routes::session::close_session,
        crate::routes::session::change_snapshot,
        crate::routes::session::session_status,
        crate::routes::session::session_events,
        crate::routes::session::begin_transition,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::record::CreateRecordRequest,
            crate::dto::record::RecordResponse,
            crate::dto::session::MountSessionRequest,
            crate::dto::session::MountSessionResponse,
            crate::dto::session::SnapshotChangeRequest,
            crate::dto::session::SessionStatusResponse,
            crate::dto::session::TransitionRequest,
            crate::dao::models::LifecycleState,
            crate::dao::models::RecordKind,
            crate::engine::persister::AutosaveStatus,
            crate::engine::resolver::ResolvedFrom,
            crate::state::lifecycle::LifecycleEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "records", description = "Editable match and training plan records"),
        (name = "session", description = "Editing sessions, autosave and lifecycle transitions"),
    )
)]
pub struct ApiDoc;
