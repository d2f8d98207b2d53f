use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, ClientSession, Collection, Database,
    bson::{DateTime, doc},
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAssignmentsDocument, MongoDraftDocument, MongoRecordDocument, doc_id,
        doc_id_in_state, doc_id_in_states,
    },
};
use crate::dao::{
    models::{AssignmentsEntity, FinalWrite, RecordEntity},
    record_store::RecordStore,
    storage::{StorageError, StorageResult},
};

const RECORD_COLLECTION_NAME: &str = "records";
const DRAFT_COLLECTION_NAME: &str = "drafts";
const ASSIGNMENT_COLLECTION_NAME: &str = "assignments";

/// MongoDB-backed [`RecordStore`]. Final writes run in a multi-document
/// transaction, which requires a replica set deployment.
#[derive(Clone)]
pub struct MongoRecordStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRecordStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.records().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"kind": 1, "lifecycle_state": 1})
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RECORD_COLLECTION_NAME,
                index: "kind,lifecycle_state",
                source,
            })?;

        Ok(())
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn records(&self) -> Collection<MongoRecordDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRecordDocument>(RECORD_COLLECTION_NAME)
    }

    async fn drafts(&self) -> Collection<MongoDraftDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoDraftDocument>(DRAFT_COLLECTION_NAME)
    }

    async fn assignments(&self) -> Collection<MongoAssignmentsDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoAssignmentsDocument>(ASSIGNMENT_COLLECTION_NAME)
    }

    async fn create_record(&self, record: RecordEntity) -> MongoResult<()> {
        let id = record.id;
        let document: MongoRecordDocument = record.into();
        self.records()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveRecord { id, source })?;
        Ok(())
    }

    async fn read_record(&self, id: Uuid) -> MongoResult<Option<RecordEntity>> {
        let Some(document) = self
            .records()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRecord { id, source })?
        else {
            return Ok(None);
        };

        let draft = self
            .drafts()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRecord { id, source })?;

        Ok(Some(document.into_entity(id, draft)))
    }

    async fn read_assignments(&self, id: Uuid) -> MongoResult<Option<AssignmentsEntity>> {
        let document = self
            .assignments()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRecord { id, source })?;
        Ok(document.map(|doc| doc.into_entity(id)))
    }

    /// Upsert the draft in a transaction that also touches the record while it
    /// is in a drafting state, so it conflicts with any concurrent final write.
    async fn write_draft(&self, id: Uuid, fields: Value) -> StorageResult<()> {
        let wrap = |source| MongoDaoError::WriteDraft { id, source };

        let mut session = self.client().await.start_session().await.map_err(wrap)?;
        session.start_transaction().await.map_err(wrap)?;

        match self.write_draft_in(&mut session, id, fields).await {
            Ok(()) => {
                session.commit_transaction().await.map_err(wrap)?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(record_id = %id, error = %abort_err, "failed to abort draft write transaction");
                }
                Err(err)
            }
        }
    }

    async fn write_draft_in(
        &self,
        session: &mut ClientSession,
        id: Uuid,
        fields: Value,
    ) -> StorageResult<()> {
        let wrap = |source| MongoDaoError::WriteDraft { id, source };
        let records = self.records().await;

        let document = records
            .find_one(doc_id(id))
            .session(&mut *session)
            .await
            .map_err(wrap)?
            .ok_or(StorageError::NotFound { id })?;
        let closed = StorageError::DraftingClosed {
            id,
            state: document.lifecycle_state,
        };
        if !document.kind.allows_drafting(document.lifecycle_state) {
            return Err(closed);
        }

        let touched = records
            .update_one(
                doc_id_in_states(id, document.kind.drafting_states()),
                doc! {"$set": {"updated_at": DateTime::now()}},
            )
            .session(&mut *session)
            .await
            .map_err(wrap)?;
        if touched.matched_count == 0 {
            return Err(closed);
        }

        self.drafts()
            .await
            .replace_one(doc_id(id), MongoDraftDocument::new(id, fields))
            .upsert(true)
            .session(&mut *session)
            .await
            .map_err(wrap)?;
        Ok(())
    }

    async fn clear_draft(&self, id: Uuid) -> MongoResult<()> {
        self.drafts()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::WriteDraft { id, source })?;
        Ok(())
    }

    async fn write_final(&self, id: Uuid, write: FinalWrite) -> StorageResult<RecordEntity> {
        let wrap = |source| MongoDaoError::WriteFinal { id, source };

        let mut session = self.client().await.start_session().await.map_err(wrap)?;
        session.start_transaction().await.map_err(wrap)?;

        match self.write_final_in(&mut session, id, write).await {
            Ok(entity) => {
                session.commit_transaction().await.map_err(wrap)?;
                Ok(entity)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(record_id = %id, error = %abort_err, "failed to abort final write transaction");
                }
                Err(err)
            }
        }
    }

    async fn write_final_in(
        &self,
        session: &mut ClientSession,
        id: Uuid,
        write: FinalWrite,
    ) -> StorageResult<RecordEntity> {
        let wrap = |source| MongoDaoError::WriteFinal { id, source };
        let records = self.records().await;

        let mut document = records
            .find_one(doc_id(id))
            .session(&mut *session)
            .await
            .map_err(wrap)?
            .ok_or(StorageError::NotFound { id })?;

        if document.lifecycle_state != write.from {
            return Err(StorageError::StateConflict {
                id,
                expected: write.from,
                actual: document.lifecycle_state,
            });
        }

        let now = DateTime::now();
        document.lifecycle_state = write.to;
        document.updated_at = now;
        if let Some(fields) = write.committed_fields {
            document.committed_fields = fields;
        }

        // Filtering on the previous state makes a concurrent transition lose the race.
        let replaced = records
            .replace_one(doc_id_in_state(id, write.from), &document)
            .session(&mut *session)
            .await
            .map_err(wrap)?;
        if replaced.matched_count == 0 {
            return Err(StorageError::StateConflict {
                id,
                expected: write.from,
                actual: write.to,
            });
        }

        let drafts = self.drafts().await;
        let draft = if write.clear_draft {
            drafts
                .delete_one(doc_id(id))
                .session(&mut *session)
                .await
                .map_err(wrap)?;
            None
        } else {
            drafts
                .find_one(doc_id(id))
                .session(&mut *session)
                .await
                .map_err(wrap)?
        };

        if let Some(entries) = write.assignments {
            self.assignments()
                .await
                .replace_one(
                    doc_id(id),
                    MongoAssignmentsDocument::new(id, entries, now),
                )
                .upsert(true)
                .session(&mut *session)
                .await
                .map_err(wrap)?;
        }

        Ok(document.into_entity(id, draft))
    }
}

impl RecordStore for MongoRecordStore {
    fn create_record(&self, record: RecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_record(record).await.map_err(Into::into) })
    }

    fn read_record(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RecordEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.read_record(id).await.map_err(Into::into) })
    }

    fn read_assignments(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.read_assignments(id).await.map_err(Into::into) })
    }

    fn write_draft(&self, id: Uuid, fields: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_draft(id, fields).await })
    }

    fn clear_draft(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.clear_draft(id).await.map_err(Into::into) })
    }

    fn write_final(
        &self,
        id: Uuid,
        write: FinalWrite,
    ) -> BoxFuture<'static, StorageResult<RecordEntity>> {
        let store = self.clone();
        Box::pin(async move { store.write_final(id, write).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
