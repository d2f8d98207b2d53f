//! Touchline Back binary entrypoint wiring the REST and SSE layers to the
//! configured record store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use touchline_back::{
    config::AppConfig,
    dao::{
        record_store::{RecordStore, memory::MemoryRecordStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

const STORE_BACKEND_ENV: &str = "STORE_BACKEND";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::with_config(AppConfig::load());
    spawn_storage(app_state.clone())?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    close_sessions(&app_state).await;
    Ok(())
}

/// Start the storage supervisor for the backend named by `STORE_BACKEND`
/// (`memory`, `mongo` or `couch`).
fn spawn_storage(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var(STORE_BACKEND_ENV).unwrap_or_else(|_| default_backend().into());
    info!(backend = %backend, "selecting record store backend");

    match backend.as_str() {
        "memory" => {
            let store = MemoryRecordStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store)) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use touchline_back::dao::record_store::mongodb::{MongoConfig, MongoRecordStore};

            let uri =
                env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
            let db_name = env::var("MONGO_DB").ok();
            tokio::spawn(storage_supervisor::run(state, move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                    let store = MongoRecordStore::connect(config).await?;
                    Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store))
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use touchline_back::dao::record_store::couchdb::{CouchConfig, CouchRecordStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchRecordStore::connect(config).await?;
                Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store))
            }));
        }
        other => anyhow::bail!("unsupported {STORE_BACKEND_ENV} `{other}`"),
    }

    Ok(())
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else {
        "memory"
    }
}

/// Stop every autosave loop; writes already in flight are allowed to land.
async fn close_sessions(state: &SharedState) {
    let ids: Vec<_> = state.sessions().iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, session)) = state.sessions().remove(&id) {
            session.close(false).await;
        }
    }
    info!("editing sessions closed");
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
