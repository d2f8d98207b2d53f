use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::{AssignmentsEntity, LifecycleState, RecordEntity, RecordKind},
    record_store::couchdb::error::CouchDaoError,
};

pub const RECORD_PREFIX: &str = "record::";

/// A record, its draft and its assignments share one CouchDB document so a
/// single revisioned PUT applies a final write atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRecordDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub record: RecordBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBody {
    pub kind: RecordKind,
    pub lifecycle_state: LifecycleState,
    pub committed_fields: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<AssignmentsBody>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentsBody {
    pub entries: Value,
    pub updated_at: SystemTime,
}

impl From<RecordEntity> for CouchRecordDocument {
    fn from(record: RecordEntity) -> Self {
        Self {
            id: record_doc_id(record.id),
            rev: None,
            record: RecordBody {
                kind: record.kind,
                lifecycle_state: record.lifecycle_state,
                committed_fields: record.committed_fields,
                draft: record.draft,
                assignments: None,
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        }
    }
}

impl CouchRecordDocument {
    pub fn try_into_entity(self) -> Result<RecordEntity, CouchDaoError> {
        Ok(RecordEntity {
            id: extract_uuid(&self.id)?,
            kind: self.record.kind,
            lifecycle_state: self.record.lifecycle_state,
            committed_fields: self.record.committed_fields,
            draft: self.record.draft,
            created_at: self.record.created_at,
            updated_at: self.record.updated_at,
        })
    }

    pub fn assignments_entity(&self) -> Result<Option<AssignmentsEntity>, CouchDaoError> {
        let Some(assignments) = &self.record.assignments else {
            return Ok(None);
        };

        Ok(Some(AssignmentsEntity {
            record_id: extract_uuid(&self.id)?,
            entries: assignments.entries.clone(),
            updated_at: assignments.updated_at,
        }))
    }
}

pub fn record_doc_id(id: Uuid) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_round_trips_through_extract() {
        let id = Uuid::new_v4();
        assert_eq!(extract_uuid(&record_doc_id(id)).unwrap(), id);
    }

    #[test]
    fn extract_rejects_foreign_ids() {
        assert!(matches!(
            extract_uuid("record-without-separator"),
            Err(CouchDaoError::InvalidDocId {
                kind: "missing separator",
                ..
            })
        ));
        assert!(matches!(
            extract_uuid("record::not-a-uuid"),
            Err(CouchDaoError::InvalidDocId {
                kind: "invalid UUID",
                ..
            })
        ));
    }
}
