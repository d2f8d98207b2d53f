/// Database model definitions.
pub mod models;
/// Record, draft and assignment persistence backends.
pub mod record_store;
/// Storage abstraction layer for database operations.
pub mod storage;
