//! Per-context fallback snapshots kept in memory next to the record store.
//!
//! Entries are written on every accepted edit and consulted when an editor
//! mounts and the store holds no draft.

use std::time::SystemTime;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// Last snapshot seen for a record in one editing context (an editor screen,
/// a browser tab), kept outside the record store so a reload can recover
/// edits that never reached a draft write.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub fields: Value,
    pub stored_at: SystemTime,
}

/// Fallback snapshots keyed by `(record_id, context_id)`.
#[derive(Debug, Default)]
pub struct FallbackCache {
    entries: DashMap<(Uuid, String), CachedSnapshot>,
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest snapshot for the context, replacing any previous one.
    pub fn put(&self, record_id: Uuid, context_id: &str, fields: Value) {
        self.entries.insert(
            (record_id, context_id.to_owned()),
            CachedSnapshot {
                fields,
                stored_at: SystemTime::now(),
            },
        );
    }

    pub fn get(&self, record_id: Uuid, context_id: &str) -> Option<CachedSnapshot> {
        self.entries
            .get(&(record_id, context_id.to_owned()))
            .map(|entry| entry.clone())
    }

    /// Drop the entry of one context.
    pub fn clear(&self, record_id: Uuid, context_id: &str) -> bool {
        self.entries
            .remove(&(record_id, context_id.to_owned()))
            .is_some()
    }

    /// Drop every context's entry for a record, returning how many were removed.
    pub fn evict_record(&self, record_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != record_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
