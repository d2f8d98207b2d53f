pub mod coordinator;
pub mod guards;
pub mod lifecycle;
pub mod session;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::record_store::RecordStore,
    engine::cache::FallbackCache,
    error::ServiceError,
    state::session::EditingSession,
};

pub type SharedState = Arc<AppState>;

/// Swappable handle to the installed record store, shared by the application
/// state and every autosave task so a reconnect is picked up everywhere.
#[derive(Clone, Default)]
pub struct StoreSlot {
    inner: Arc<RwLock<Option<Arc<dyn RecordStore>>>>,
}

impl StoreSlot {
    /// Slot already holding `store`.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(store))),
        }
    }

    /// Currently installed store, if any.
    pub async fn current(&self) -> Option<Arc<dyn RecordStore>> {
        self.inner.read().await.as_ref().cloned()
    }

    async fn replace(&self, store: Option<Arc<dyn RecordStore>>) {
        *self.inner.write().await = store;
    }
}

/// Central application state: storage handle, open editing sessions and the
/// fallback snapshot cache.
pub struct AppState {
    store: StoreSlot,
    degraded: watch::Sender<bool>,
    sessions: DashMap<Uuid, Arc<EditingSession>>,
    cache: Arc<FallbackCache>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] with built-in configuration.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new() -> SharedState {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: StoreSlot::default(),
            degraded: degraded_tx,
            sessions: DashMap::new(),
            cache: Arc::new(FallbackCache::new()),
            config,
        })
    }

    /// Obtain a handle to the current record store, if one is installed.
    pub async fn record_store(&self) -> Option<Arc<dyn RecordStore>> {
        self.store.current().await
    }

    /// Current record store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_record_store(&self) -> Result<Arc<dyn RecordStore>, ServiceError> {
        self.record_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new record store implementation and leave degraded mode.
    pub async fn set_record_store(&self, store: Arc<dyn RecordStore>) {
        self.store.replace(Some(store)).await;
        self.update_degraded(false);
    }

    /// Remove the current record store and enter degraded mode.
    pub async fn clear_record_store(&self) {
        self.store.replace(None).await;
        self.update_degraded(true);
    }

    /// Shared handle to the store slot.
    pub fn store_slot(&self) -> StoreSlot {
        self.store.clone()
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Open editing sessions keyed by record.
    pub fn sessions(&self) -> &DashMap<Uuid, Arc<EditingSession>> {
        &self.sessions
    }

    /// Look up the open editing session of a record.
    pub fn session(&self, record_id: Uuid) -> Option<Arc<EditingSession>> {
        self.sessions.get(&record_id).map(|entry| entry.clone())
    }

    pub fn cache(&self) -> &FallbackCache {
        &self.cache
    }

    pub fn cache_handle(&self) -> Arc<FallbackCache> {
        self.cache.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
