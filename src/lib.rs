//! Ops Portal - release management backend.
//!
//! Keeps releases as trees of features and tasks, serves them over a REST
//! API and mirrors each node to a GitHub issue on request.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

use config::{ServerConfig, StorageBackend};
use error::AppError;
use services::server::{start_server, AppState};
use std::sync::Arc;
use store::{MemoryStore, ReleaseRepository, SqliteStore};

/// Open the configured storage backend.
pub async fn open_store(config: &ServerConfig) -> Result<Arc<dyn ReleaseRepository>, AppError> {
    let store: Arc<dyn ReleaseRepository> = match config.storage {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => {
            log::info!("[store] Opening database at {}", config.db_path.display());
            Arc::new(SqliteStore::open(&config.db_path).await?)
        }
    };
    log::info!("[store] Using {} storage", store.backend_name());
    Ok(store)
}

/// Run the server until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), AppError> {
    let store = open_store(&config).await?;
    if !config.no_seed {
        store::seed::seed_if_empty(store.as_ref()).await?;
    }

    let state = AppState::from_settings(store.clone(), config.github_settings())?;
    let handle = start_server(config.bind, state).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[server] Failed to listen for shutdown signal: {}", e);
    }
    handle.shutdown();
    handle.wait().await;
    store.close().await;
    Ok(())
}
