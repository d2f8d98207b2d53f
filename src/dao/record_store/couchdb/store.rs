use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::{AssignmentsEntity, FinalWrite, RecordEntity},
    record_store::RecordStore,
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{AssignmentsBody, CouchRecordDocument, record_doc_id},
};

/// CouchDB-backed [`RecordStore`] relying on document revisions for
/// optimistic concurrency.
#[derive(Clone)]
pub struct CouchRecordStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRecordStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a stale `_rev` surfaces as [`CouchDaoError::Conflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn load(&self, id: Uuid) -> StorageResult<CouchRecordDocument> {
        self.get_document::<CouchRecordDocument>(&record_doc_id(id))
            .await?
            .ok_or(StorageError::NotFound { id })
    }

    async fn write_draft(&self, id: Uuid, fields: Option<Value>) -> StorageResult<()> {
        let mut document = self.load(id).await?;
        let record = &document.record;
        // The revision check of the PUT rejects a final write that landed since the load.
        if fields.is_some() && !record.kind.allows_drafting(record.lifecycle_state) {
            return Err(StorageError::DraftingClosed {
                id,
                state: record.lifecycle_state,
            });
        }
        document.record.draft = fields;
        document.record.updated_at = SystemTime::now();
        self.put_document(&document.id.clone(), &document)
            .await
            .map_err(Into::into)
    }

    async fn write_final(&self, id: Uuid, write: FinalWrite) -> StorageResult<RecordEntity> {
        let mut document = self.load(id).await?;
        if document.record.lifecycle_state != write.from {
            return Err(StorageError::StateConflict {
                id,
                expected: write.from,
                actual: document.record.lifecycle_state,
            });
        }

        let now = SystemTime::now();
        let record = &mut document.record;
        record.lifecycle_state = write.to;
        record.updated_at = now;
        if let Some(fields) = write.committed_fields {
            record.committed_fields = fields;
        }
        if write.clear_draft {
            record.draft = None;
        }
        if let Some(entries) = write.assignments {
            record.assignments = Some(AssignmentsBody {
                entries,
                updated_at: now,
            });
        }

        self.put_document(&document.id.clone(), &document).await?;
        document.try_into_entity().map_err(Into::into)
    }
}

impl RecordStore for CouchRecordStore {
    fn create_record(&self, record: RecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchRecordDocument::from(record);
            store
                .put_document(&document.id, &document)
                .await
                .map_err(Into::into)
        })
    }

    fn read_record(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RecordEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchRecordDocument>(&record_doc_id(id))
                .await?;
            maybe_doc
                .map(CouchRecordDocument::try_into_entity)
                .transpose()
                .map_err(Into::into)
        })
    }

    fn read_assignments(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AssignmentsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchRecordDocument>(&record_doc_id(id))
                .await?;
            match maybe_doc {
                Some(doc) => doc.assignments_entity().map_err(Into::into),
                None => Ok(None),
            }
        })
    }

    fn write_draft(&self, id: Uuid, fields: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_draft(id, Some(fields)).await })
    }

    fn clear_draft(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_draft(id, None).await })
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
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
