use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{LifecycleState, RecordEntity, RecordKind},
    dto::{format_system_time, validation::validate_fields_object},
};

/// Payload used to create a new editable record.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub kind: RecordKind,
    /// Initial committed fields; an empty object when omitted.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    #[validate(custom(function = "validate_fields_object"))]
    pub committed_fields: Option<Value>,
}

/// Record as exposed to editors.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub id: Uuid,
    pub kind: RecordKind,
    pub lifecycle_state: LifecycleState,
    #[schema(value_type = Object)]
    pub committed_fields: Value,
    /// Autosaved in-progress edits, absent when there are none.
    #[schema(value_type = Option<Object>)]
    pub draft: Option<Value>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

impl From<RecordEntity> for RecordResponse {
    fn from(record: RecordEntity) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            lifecycle_state: record.lifecycle_state,
            committed_fields: record.committed_fields,
            draft: record.draft,
            created_at: format_system_time(record.created_at),
            updated_at: format_system_time(record.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_request_rejects_non_object_fields() {
        let request: CreateRecordRequest =
            serde_json::from_value(json!({"kind": "match", "committedFields": [1]})).unwrap();
        assert!(request.validate().is_err());

        let request: CreateRecordRequest =
            serde_json::from_value(json!({"kind": "training_plan"})).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn response_omits_missing_draft() {
        let record = RecordEntity::new(RecordKind::Match, json!({"formation": "2-3-1"}));
        let body = serde_json::to_value(RecordResponse::from(record)).unwrap();

        assert_eq!(body["lifecycleState"], json!("scheduled"));
        assert_eq!(body["committedFields"], json!({"formation": "2-3-1"}));
        assert!(body.get("draft").is_none());
    }
}
