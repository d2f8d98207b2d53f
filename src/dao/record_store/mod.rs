#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{AssignmentsEntity, FinalWrite, RecordEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

/// Abstraction over the document database holding editable records, their
/// drafts and their assignment collections.
pub trait RecordStore: Send + Sync {
    /// Persist a brand-new record.
    fn create_record(&self, record: RecordEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a record with its lifecycle state, committed fields and draft.
    fn read_record(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RecordEntity>>>;
    /// Fetch the roster / assignment entries stored apart from the draft.
    fn read_assignments(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentsEntity>>>;
    /// Idempotent upsert of the draft blob of a record.
    fn write_draft(&self, id: Uuid, fields: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the draft blob of a record, leaving everything else untouched.
    fn clear_draft(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Apply an authoritative write: committed fields, assignments, draft clear
    /// and lifecycle change succeed or fail together.
    fn write_final(
        &self,
        id: Uuid,
        write: FinalWrite,
    ) -> BoxFuture<'static, StorageResult<RecordEntity>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
