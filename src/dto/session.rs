use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::LifecycleState,
    dto::validation::{validate_context_id, validate_fields_object},
    engine::{persister::AutosaveStatus, resolver::ResolvedFrom},
    state::lifecycle::LifecycleEvent,
};

const DEFAULT_CONTEXT_ID: &str = "default";

fn default_context_id() -> String {
    DEFAULT_CONTEXT_ID.into()
}

/// Payload used when an editor mounts on a record.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MountSessionRequest {
    /// Editing context (screen or tab) whose fallback cache entry is consulted.
    #[serde(default = "default_context_id")]
    #[validate(custom(function = "validate_context_id"))]
    pub context_id: String,
}

impl Default for MountSessionRequest {
    fn default() -> Self {
        Self {
            context_id: default_context_id(),
        }
    }
}

/// Initial snapshot handed to a freshly mounted editor.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountSessionResponse {
    pub record_id: Uuid,
    pub context_id: String,
    pub lifecycle_state: LifecycleState,
    pub drafting_enabled: bool,
    /// Source that decided the snapshot.
    pub resolved_from: ResolvedFrom,
    #[schema(value_type = Object)]
    pub snapshot: Value,
}

/// Latest snapshot held by the editor.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SnapshotChangeRequest {
    #[schema(value_type = Object)]
    #[validate(custom(function = "validate_fields_object"))]
    pub snapshot: Value,
}

/// Autosave state of an editing session.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub record_id: Uuid,
    pub lifecycle_state: LifecycleState,
    /// True while a lifecycle transition is running.
    pub finalizing: bool,
    pub drafting_enabled: bool,
    pub autosave: AutosaveStatus,
    /// Editing context of the open session, absent when none is mounted.
    pub context_id: Option<String>,
}

/// Lifecycle transition requested by an editor.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TransitionRequest {
    pub event: LifecycleEvent,
    /// Fields to finalize; the session's current snapshot when omitted.
    #[schema(value_type = Option<Object>)]
    #[validate(custom(function = "validate_fields_object"))]
    pub snapshot: Option<Value>,
}

/// Query accepted when an editor unmounts.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CloseSessionQuery {
    /// Also drop the fallback cache entry of the session's context.
    #[serde(default)]
    pub evict_cache: bool,
}
