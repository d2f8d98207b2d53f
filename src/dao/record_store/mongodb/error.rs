//! Error types shared by the MongoDB storage implementation.

use mongodb::{bson, error::Error as MongoError};
use thiserror::Error;
use uuid::Uuid;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save record `{id}`")]
    SaveRecord {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load record `{id}`")]
    LoadRecord {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to write draft of record `{id}`")]
    WriteDraft {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("final write of record `{id}` failed")]
    WriteFinal {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to encode a field of record `{id}` as BSON")]
    Encode {
        id: Uuid,
        #[source]
        source: bson::error::Error,
    },
}
