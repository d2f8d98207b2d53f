use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod records;
pub mod session;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(records::router())
        .merge(session::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{dao::record_store::memory::MemoryRecordStore, state::AppState};

    async fn state_with_memory_store() -> SharedState {
        let state = AppState::new();
        state
            .set_record_store(Arc::new(MemoryRecordStore::new()))
            .await;
        state
    }

    async fn send(
        state: &SharedState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn healthcheck_reports_degraded_without_store() {
        let state = AppState::new();
        let (status, body) = send(&state, Method::GET, "/healthcheck", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("degraded"));
        assert_eq!(body["open_sessions"], json!(0));
    }

    #[tokio::test]
    async fn records_are_unavailable_in_degraded_mode() {
        let state = AppState::new();
        let (status, _) = send(
            &state,
            Method::POST,
            "/records",
            Some(json!({"kind": "match"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn training_plan_begins_through_its_session() {
        let state = state_with_memory_store().await;
        let (status, created) = send(
            &state,
            Method::POST,
            "/records",
            Some(json!({"kind": "training_plan", "committedFields": {"drills": []}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, mounted) = send(
            &state,
            Method::POST,
            &format!("/records/{id}/session"),
            Some(json!({"contextId": "planner"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mounted["lifecycleState"], json!("scheduled"));
        assert_eq!(mounted["draftingEnabled"], json!(true));

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/records/{id}/transitions"),
            Some(json!({"event": "begin_match"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, record) = send(
            &state,
            Method::POST,
            &format!("/records/{id}/transitions"),
            Some(json!({"event": "begin_match", "snapshot": {"drills": ["rondo"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["lifecycleState"], json!("played"));
        assert_eq!(record["committedFields"], json!({"drills": ["rondo"]}));

        let (status, session) = send(
            &state,
            Method::GET,
            &format!("/records/{id}/session/status"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["lifecycleState"], json!("played"));
        assert_eq!(session["contextId"], json!("planner"));
        assert_eq!(session["autosave"], json!({"status": "idle"}));

        let (status, _) = send(
            &state,
            Method::DELETE,
            &format!("/records/{id}/session?evictCache=true"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.sessions().is_empty());
    }

    #[tokio::test]
    async fn session_routes_require_a_mounted_editor() {
        let state = state_with_memory_store().await;
        let (_, created) = send(
            &state,
            Method::POST,
            "/records",
            Some(json!({"kind": "match"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &state,
            Method::PUT,
            &format!("/records/{id}/session/snapshot"),
            Some(json!({"snapshot": {"formation": "2-3-1"}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/records/{id}/transitions"),
            Some(json!({"event": "begin_match"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &state,
            Method::GET,
            &format!("/records/{id}/session/status"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["draftingEnabled"], json!(true));
        assert!(body.get("contextId").is_none());
    }

    #[tokio::test]
    async fn invalid_context_ids_are_rejected() {
        let state = state_with_memory_store().await;
        let (_, created) = send(
            &state,
            Method::POST,
            "/records",
            Some(json!({"kind": "match"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/records/{id}/session"),
            Some(json!({"contextId": "no spaces allowed"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.sessions().is_empty());
    }

    #[tokio::test]
    async fn openapi_document_lists_session_routes() {
        let state = AppState::new();
        let (status, body) = send(&state, Method::GET, "/api-doc/openapi.json", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/records/{id}/transitions").is_some());
        assert!(body["paths"].get("/records/{id}/session/events").is_some());
    }

    #[tokio::test]
    async fn unknown_records_are_not_found() {
        let state = state_with_memory_store().await;
        let (status, _) = send(
            &state,
            Method::GET,
            "/records/00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
