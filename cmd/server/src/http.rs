//! A thin `axum` adapter over the lifecycle engine. `/health` and
//! `/metrics` are the only endpoints production operators actually need;
//! the sandbox CRUD routes exist to demonstrate the integration point and
//! intentionally carry no auth/middleware (that stays out of scope).

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use opensandbox_core::{SandboxId, SandboxInfo, SandboxListFilter, SandboxRequest, SandboxState};
use opensandbox_lifecycle::{format_endpoint, LifecycleEngine, LifecycleError, RouterMode};
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;

pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub metrics: Arc<Metrics>,
    pub router_mode: RouterMode,
}

/// Rewrites a sandbox's raw backend endpoints into the externally routable
/// URLs the configured router mode produces, per port.
fn apply_router(mode: &RouterMode, mut info: SandboxInfo) -> SandboxInfo {
    let id = info.id.clone();
    let endpoints = std::mem::take(&mut info.endpoints)
        .into_iter()
        .map(|(name, raw)| (name, format_endpoint(mode, &id, &raw).url))
        .collect();
    info.endpoints = endpoints;
    info
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/sandboxes", post(create_sandbox).get(list_sandboxes))
        .route("/v1/sandboxes/{id}", get(get_sandbox).delete(expire_sandbox))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        state.metrics.encode(),
    )
        .into_response()
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for LifecycleErrorResponse {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LifecycleError::Input(_) => (StatusCode::BAD_REQUEST, "INVALID_PARAMETER"),
            LifecycleError::Conflict(_) => (StatusCode::CONFLICT, "SANDBOX_ID_COLLISION"),
            LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "SANDBOX_NOT_FOUND"),
            LifecycleError::BackendTransient(_) => (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE"),
            LifecycleError::BackendPermanent(_) => (StatusCode::BAD_GATEWAY, "BACKEND_REJECTED"),
            LifecycleError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        (
            status,
            Json(ErrorBody {
                code,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

struct LifecycleErrorResponse(LifecycleError);

impl From<LifecycleError> for LifecycleErrorResponse {
    fn from(e: LifecycleError) -> Self {
        Self(e)
    }
}

async fn create_sandbox(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SandboxRequest>,
) -> Result<Response, LifecycleErrorResponse> {
    let info = state.engine.create(request).await?;
    state.metrics.sandboxes_created_total.inc();
    let info = apply_router(&state.router_mode, info);
    Ok((StatusCode::CREATED, Json(info)).into_response())
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    state: Option<SandboxState>,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

async fn list_sandboxes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, LifecycleErrorResponse> {
    let filter = SandboxListFilter {
        states: query.state.into_iter().collect(),
        metadata: Default::default(),
        page: query.page.unwrap_or(0),
        page_size: query.page_size.unwrap_or(SandboxListFilter::MAX_PAGE_SIZE),
    };
    let sandboxes = state
        .engine
        .list(&filter)
        .await?
        .into_iter()
        .map(|info| apply_router(&state.router_mode, info))
        .collect::<Vec<_>>();
    Ok(Json(sandboxes).into_response())
}

async fn get_sandbox(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, LifecycleErrorResponse> {
    let info = state.engine.get(&SandboxId::new(id)).await?;
    let info = apply_router(&state.router_mode, info);
    Ok(Json(info).into_response())
}

async fn expire_sandbox(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, LifecycleErrorResponse> {
    state.engine.expire(&SandboxId::new(id)).await?;
    state.metrics.sandboxes_expired_total.inc();
    Ok(StatusCode::NO_CONTENT.into_response())
}
