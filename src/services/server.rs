//! HTTP server.
//!
//! Wires the services into axum state, builds the router and runs it until
//! the cancellation token fires. CORS is permissive so the portal frontend
//! can be served from another origin.

use crate::config::GitHubSettings;
use crate::error::AppError;
use crate::services::api::{
    catalog_routes, dashboard_routes, github_routes, health_routes, release_routes,
};
use crate::services::github_client::GitHubClient;
use crate::services::issue_tracker::IssueTracker;
use crate::services::release_sync::ReleaseSyncService;
use crate::services::releases::ReleaseService;
use crate::store::ReleaseRepository;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

const GITHUB_NOT_CONFIGURED: &str = "GitHub integration not configured. Set GITHUB_CLOUD_TOKEN, \
     GITHUB_CLOUD_OWNER and GITHUB_CLOUD_REPO (or the GITHUB_ENTERPRISE_* equivalents)";

/// Shared state for the axum routes.
#[derive(Clone)]
pub struct AppState {
    pub releases: ReleaseService,
    /// `None` when GitHub is not configured.
    pub sync: Option<ReleaseSyncService>,
    pub github: GitHubSettings,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReleaseRepository>,
        github: GitHubSettings,
        tracker: Option<Arc<dyn IssueTracker>>,
    ) -> Self {
        Self {
            releases: ReleaseService::new(store.clone()),
            sync: tracker.map(|t| ReleaseSyncService::new(store, t)),
            github,
            started_at: Utc::now(),
        }
    }

    /// Build state from resolved settings, creating the GitHub client when
    /// the integration is configured.
    pub fn from_settings(
        store: Arc<dyn ReleaseRepository>,
        github: GitHubSettings,
    ) -> Result<Self, AppError> {
        let tracker: Option<Arc<dyn IssueTracker>> = match github.client_config() {
            Some(config) => {
                log::info!(
                    "[github] Syncing issues to {}/{} via {}",
                    config.owner,
                    config.repo,
                    config.api_base_url
                );
                let client: Arc<dyn IssueTracker> = Arc::new(GitHubClient::new(config)?);
                Some(client)
            }
            None => {
                log::warn!("[github] Integration not configured; GitHub endpoints are disabled");
                None
            }
        };
        Ok(Self::new(store, github, tracker))
    }

    pub fn store(&self) -> &Arc<dyn ReleaseRepository> {
        self.releases.store()
    }

    pub fn sync(&self) -> Result<&ReleaseSyncService, AppError> {
        self.sync
            .as_ref()
            .ok_or_else(|| AppError::configuration(GITHUB_NOT_CONFIGURED))
    }
}

/// The full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(release_routes())
        .merge(github_routes())
        .merge(catalog_routes())
        .merge(dashboard_routes())
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Unmatched paths get the same JSON error shape as the API.
async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "code": "NOT_FOUND",
            "message": format!("No route for {}", uri.path()),
        })),
    )
        .into_response()
}

/// Handle to a running server.
pub struct ServerHandle {
    cancel_token: CancellationToken,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address; differs from the requested one when port 0 was used.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the server to stop accepting connections.
    pub fn shutdown(&self) {
        log::info!("[server] Stopping server on {}", self.local_addr);
        self.cancel_token.cancel();
    }

    /// Wait for the server task to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            log::error!("[server] Server task failed: {}", e);
        }
    }
}

/// Bind `addr` and serve the API in a background task.
pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<ServerHandle, AppError> {
    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("Failed to read bound address: {}", e)))?;

    log::info!("[server] Server starting on http://{}", local_addr);

    let app = build_router(state);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_clone.cancelled().await;
        });

        if let Err(e) = server.await {
            log::error!("[server] Server error: {}", e);
        }

        log::info!("[server] Server stopped");
    });

    Ok(ServerHandle {
        cancel_token,
        local_addr,
        task,
    })
}
