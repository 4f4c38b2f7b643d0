//! REST API routes.
//!
//! JSON over HTTP under `/api/v1`, plus `/health`. Handlers are thin: they
//! extract parameters, call a service and map [`AppError`] to a status code.

use crate::config::GitHubConfigStatus;
use crate::error::AppError;
use crate::models::{
    Environment, LifecycleAction, NodePatch, NodeStatus, Release, ReleaseDraft, ReleaseNode,
    ReleaseUpdate, StatusHistoryEntry, Team, TransitionRequest, Workflow,
};
use crate::services::dashboard::{self, DashboardMetrics, DashboardStats, SystemHealth};
use crate::services::release_sync::{CloseReport, NodeCloseReport, NodeSyncReport, PublishReport};
use crate::services::releases::{InsertNodeRequest, MoveNodeRequest};
use crate::services::server::AppState;
use crate::store::ReleaseQuery;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, OptionalFromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ── Error handling ───────────────────────────────────────────────────────────

/// JSON error body.
#[derive(Serialize)]
struct ApiError {
    code: String,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(AppError);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::NotPublished { .. } => (StatusCode::BAD_REQUEST, "NOT_PUBLISHED"),
            AppError::Configuration { .. } => (StatusCode::BAD_REQUEST, "NOT_CONFIGURED"),
            AppError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::GitHubApi { .. } | AppError::Network { .. } => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
            }
            AppError::Database { .. } | AppError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        if status.is_server_error() {
            log::error!("[server] {}", self.0);
        }
        (
            status,
            Json(ApiError {
                code: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

type ApiResult<T> = Result<Json<T>, ApiErr>;

/// JSON body extractor whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

fn json_rejection(rejection: JsonRejection) -> ApiErr {
    ApiErr(AppError::invalid_input(rejection.body_text()))
}

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        Ok(Self(value))
    }
}

/// A missing body yields `None`; a malformed one is still rejected.
impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        Ok(body.map(|Json(value)| Self(value)))
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

// ── Health ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    service: &'static str,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(liveness))
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        service: "ops-portal-backend",
    })
}

// ── Releases ─────────────────────────────────────────────────────────────────

pub fn release_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/releases", get(list_releases).post(create_release))
        .route(
            "/api/v1/releases/{id}",
            get(get_release).put(update_release).delete(delete_release),
        )
        .route("/api/v1/releases/{id}/history", get(get_history))
        .route("/api/v1/releases/{id}/close", post(close_release))
        .route("/api/v1/releases/{id}/reopen", post(reopen_release))
        .route("/api/v1/releases/{id}/approve", post(approve_release))
        .route("/api/v1/releases/{id}/reject", post(reject_release))
        .route("/api/v1/releases/{id}/deploy", post(deploy_release))
        .route("/api/v1/releases/{id}/rollback", post(rollback_release))
        .route("/api/v1/releases/{id}/nodes", post(insert_node))
        .route(
            "/api/v1/releases/{id}/nodes/{node_id}",
            get(get_node).patch(update_node).delete(remove_node),
        )
        .route("/api/v1/releases/{id}/nodes/{node_id}/move", post(move_node))
}

async fn list_releases(
    State(state): State<AppState>,
    Query(query): Query<ReleaseQuery>,
) -> ApiResult<Vec<Release>> {
    Ok(Json(state.releases.list(query).await?))
}

async fn create_release(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<ReleaseDraft>,
) -> Result<(StatusCode, Json<Release>), ApiErr> {
    let release = state.releases.create(draft).await?;
    Ok((StatusCode::CREATED, Json(release)))
}

async fn get_release(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Release> {
    Ok(Json(state.releases.get(&id).await?))
}

async fn update_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<ReleaseUpdate>,
) -> ApiResult<Release> {
    Ok(Json(state.releases.update(&id, update).await?))
}

async fn delete_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    state.releases.delete(&id).await?;
    Ok(Json(MessageResponse {
        message: "Release deleted successfully".to_string(),
    }))
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<StatusHistoryEntry>> {
    Ok(Json(state.releases.history(&id, query.limit).await?))
}

async fn transition(
    state: AppState,
    id: String,
    action: LifecycleAction,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    let request = body.map(|ApiJson(b)| b).unwrap_or_default();
    Ok(Json(state.releases.transition(&id, action, &request).await?))
}

async fn close_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Close, body).await
}

async fn reopen_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Reopen, body).await
}

async fn approve_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Approve, body).await
}

async fn reject_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Reject, body).await
}

async fn deploy_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Deploy, body).await
}

async fn rollback_release(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<ApiJson<TransitionRequest>>,
) -> ApiResult<Release> {
    transition(state, id, LifecycleAction::Rollback, body).await
}

async fn insert_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<InsertNodeRequest>,
) -> Result<(StatusCode, Json<ReleaseNode>), ApiErr> {
    let node = state.releases.insert_node(&id, request).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
) -> ApiResult<ReleaseNode> {
    Ok(Json(state.releases.find_node(&id, &node_id).await?))
}

async fn update_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
    ApiJson(patch): ApiJson<NodePatch>,
) -> ApiResult<ReleaseNode> {
    Ok(Json(state.releases.update_node(&id, &node_id, &patch).await?))
}

async fn remove_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
) -> ApiResult<ReleaseNode> {
    Ok(Json(state.releases.remove_node(&id, &node_id).await?))
}

async fn move_node(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
    body: Option<ApiJson<MoveNodeRequest>>,
) -> ApiResult<ReleaseNode> {
    let request = body.map(|ApiJson(b)| b).unwrap_or_default();
    Ok(Json(state.releases.move_node(&id, &node_id, &request).await?))
}

// ── GitHub ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SyncStatusRequest {
    status: Option<NodeStatus>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CloseIssueRequest {
    reason: Option<String>,
}

pub fn github_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/github/config-status", get(github_config_status))
        .route(
            "/api/v1/releases/{id}/publish-to-github",
            post(publish_to_github),
        )
        .route(
            "/api/v1/releases/{id}/nodes/{node_id}/sync-github",
            post(sync_node_with_github),
        )
        .route(
            "/api/v1/releases/{id}/nodes/{node_id}/close-github-issue",
            post(close_node_issue),
        )
        .route(
            "/api/v1/releases/{id}/close-github-issues",
            post(close_github_issues),
        )
}

async fn github_config_status(State(state): State<AppState>) -> Json<GitHubConfigStatus> {
    Json(state.github.status())
}

async fn publish_to_github(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PublishReport> {
    Ok(Json(state.sync()?.publish(&id).await?))
}

async fn sync_node_with_github(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<SyncStatusRequest>,
) -> ApiResult<NodeSyncReport> {
    let sync = state.sync()?;
    let status = body
        .status
        .ok_or_else(|| AppError::invalid_input_field("No status update provided", "status"))?;
    Ok(Json(sync.sync_node_status(&id, &node_id, status).await?))
}

async fn close_node_issue(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(String, String)>,
    body: Option<ApiJson<CloseIssueRequest>>,
) -> ApiResult<NodeCloseReport> {
    let sync = state.sync()?;
    let request = body.map(|ApiJson(b)| b).unwrap_or_default();
    Ok(Json(
        sync.close_node_issue(&id, &node_id, request.reason.as_deref())
            .await?,
    ))
}

async fn close_github_issues(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CloseReport> {
    Ok(Json(state.sync()?.close_all(&id).await?))
}

// ── Catalog ──────────────────────────────────────────────────────────────────

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/environments", get(list_environments))
        .route(
            "/api/v1/environments/{env_id}/status",
            get(get_environment_status),
        )
        .route("/api/v1/teams", get(list_teams))
        .route("/api/v1/teams/{id}/members", get(get_team_members))
        .route("/api/v1/workflows", get(list_workflows))
}

async fn list_environments(State(state): State<AppState>) -> ApiResult<Vec<Environment>> {
    Ok(Json(state.store().list_environments().await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentStatus {
    id: String,
    status: String,
    last_checked: DateTime<Utc>,
}

async fn get_environment_status(
    State(state): State<AppState>,
    Path(env_id): Path<String>,
) -> ApiResult<EnvironmentStatus> {
    let environment = state
        .store()
        .list_environments()
        .await?
        .into_iter()
        .find(|e| e.id == env_id)
        .ok_or_else(|| AppError::not_found_with_id("Environment", &env_id))?;
    Ok(Json(EnvironmentStatus {
        id: environment.id,
        status: environment.status,
        last_checked: Utc::now(),
    }))
}

async fn list_teams(State(state): State<AppState>) -> ApiResult<Vec<Team>> {
    Ok(Json(state.store().list_teams().await?))
}

async fn get_team_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    let team = state
        .store()
        .get_team(&id)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Team", &id))?;
    Ok(Json(team.members))
}

async fn list_workflows(State(state): State<AppState>) -> ApiResult<Vec<Workflow>> {
    Ok(Json(state.store().list_workflows().await?))
}

// ── Dashboard ────────────────────────────────────────────────────────────────

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/dashboard/stats", get(dashboard_stats))
        .route("/api/v1/dashboard/metrics", get(dashboard_metrics))
        .route("/api/v1/dashboard/health", get(dashboard_health))
}

async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<DashboardStats> {
    Ok(Json(dashboard::stats(state.store().as_ref()).await?))
}

async fn dashboard_metrics(State(state): State<AppState>) -> ApiResult<DashboardMetrics> {
    Ok(Json(dashboard::metrics(state.store().as_ref()).await?))
}

async fn dashboard_health(State(state): State<AppState>) -> Json<SystemHealth> {
    Json(dashboard::health(state.store().as_ref(), state.started_at).await)
}
