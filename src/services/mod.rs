/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Record creation, lookup and draft discard.
pub mod record_service;
/// Editing sessions, autosave status and lifecycle transitions.
pub mod session_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
