use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{AssignmentsEntity, LifecycleState, RecordEntity, RecordKind};

/// Record document without its draft; drafts live in their own collection so
/// autosave upserts never rewrite the committed fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRecordDocument {
    #[serde(rename = "_id")]
    id: String,
    pub kind: RecordKind,
    pub lifecycle_state: LifecycleState,
    pub committed_fields: Value,
    created_at: DateTime,
    pub updated_at: DateTime,
}

impl From<RecordEntity> for MongoRecordDocument {
    fn from(value: RecordEntity) -> Self {
        Self {
            id: value.id.to_string(),
            kind: value.kind,
            lifecycle_state: value.lifecycle_state,
            committed_fields: value.committed_fields,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl MongoRecordDocument {
    /// Assemble the storage-agnostic entity; `id` is the key the document was
    /// looked up with.
    pub fn into_entity(self, id: Uuid, draft: Option<MongoDraftDocument>) -> RecordEntity {
        let updated_at = match &draft {
            Some(draft) if draft.updated_at > self.updated_at => draft.updated_at,
            _ => self.updated_at,
        };

        RecordEntity {
            id,
            kind: self.kind,
            lifecycle_state: self.lifecycle_state,
            committed_fields: self.committed_fields,
            draft: draft.map(|doc| doc.fields),
            created_at: self.created_at.to_system_time(),
            updated_at: updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDraftDocument {
    #[serde(rename = "_id")]
    record_id: String,
    fields: Value,
    updated_at: DateTime,
}

impl MongoDraftDocument {
    pub fn new(record_id: Uuid, fields: Value) -> Self {
        Self {
            record_id: record_id.to_string(),
            fields,
            updated_at: DateTime::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAssignmentsDocument {
    #[serde(rename = "_id")]
    record_id: String,
    entries: Value,
    updated_at: DateTime,
}

impl MongoAssignmentsDocument {
    pub fn new(record_id: Uuid, entries: Value, updated_at: DateTime) -> Self {
        Self {
            record_id: record_id.to_string(),
            entries,
            updated_at,
        }
    }

    pub fn into_entity(self, record_id: Uuid) -> AssignmentsEntity {
        AssignmentsEntity {
            record_id,
            entries: self.entries,
            updated_at: self.updated_at.to_system_time(),
        }
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn doc_id_in_state(id: Uuid, state: LifecycleState) -> Document {
    doc! {"_id": id.to_string(), "lifecycle_state": state.as_str()}
}

pub fn doc_id_in_states(id: Uuid, states: &[LifecycleState]) -> Document {
    let states: Vec<&str> = states.iter().map(LifecycleState::as_str).collect();
    doc! {"_id": id.to_string(), "lifecycle_state": {"$in": states}}
}
