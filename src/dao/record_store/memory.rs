//! Process-local record store used for development runs and tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::{AssignmentsEntity, FinalWrite, RecordEntity},
    record_store::RecordStore,
    storage::{StorageError, StorageResult},
};

/// [`RecordStore`] keeping every document in memory.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<DashMap<Uuid, RecordEntity>>,
    assignments: Arc<DashMap<Uuid, AssignmentsEntity>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_final(&self, id: Uuid, write: FinalWrite) -> StorageResult<RecordEntity> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or(StorageError::NotFound { id })?;

        if entry.lifecycle_state != write.from {
            return Err(StorageError::StateConflict {
                id,
                expected: write.from,
                actual: entry.lifecycle_state,
            });
        }

        let now = SystemTime::now();
        if let Some(fields) = write.committed_fields {
            entry.committed_fields = fields;
        }
        if write.clear_draft {
            entry.draft = None;
        }
        entry.lifecycle_state = write.to;
        entry.updated_at = now;

        // The record entry stays locked while assignments are written so readers
        // never observe the new state without its assignments.
        if let Some(entries) = write.assignments {
            self.assignments.insert(
                id,
                AssignmentsEntity {
                    record_id: id,
                    entries,
                    updated_at: now,
                },
            );
        }

        Ok(entry.clone())
    }
}

impl RecordStore for MemoryRecordStore {
    fn create_record(&self, record: RecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.records.insert(record.id, record);
            Ok(())
        })
    }

    fn read_record(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.records.get(&id).map(|entry| entry.clone())) })
    }

    fn read_assignments(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentsEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.assignments.get(&id).map(|entry| entry.clone())) })
    }

    fn write_draft(&self, id: Uuid, fields: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut entry = store
                .records
                .get_mut(&id)
                .ok_or(StorageError::NotFound { id })?;
            if !entry.kind.allows_drafting(entry.lifecycle_state) {
                return Err(StorageError::DraftingClosed {
                    id,
                    state: entry.lifecycle_state,
                });
            }
            entry.draft = Some(fields);
            entry.updated_at = SystemTime::now();
            Ok(())
        })
    }

    fn clear_draft(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut entry = store
                .records
                .get_mut(&id)
                .ok_or(StorageError::NotFound { id })?;
            entry.draft = None;
            entry.updated_at = SystemTime::now();
            Ok(())
        })
    }

    fn write_final(
        &self,
        id: Uuid,
        write: FinalWrite,
    ) -> BoxFuture<'static, StorageResult<RecordEntity>> {
        let store = self.clone();
        Box::pin(async move { store.apply_final(id, write) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
