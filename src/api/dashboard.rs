use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    catalog::ResourceKind,
    metrics,
    scheduler::{RefreshOutcome, RefreshScheduler, ViewSnapshot},
    DashboardError, Result,
};

#[derive(Clone)]
pub struct DashboardState {
    pub views: Arc<HashMap<ResourceKind, Arc<RefreshScheduler>>>,
}

impl DashboardState {
    pub fn new(schedulers: impl IntoIterator<Item = Arc<RefreshScheduler>>) -> Self {
        let views = schedulers
            .into_iter()
            .map(|s| (s.view().resource, s))
            .collect();
        Self {
            views: Arc::new(views),
        }
    }

    fn scheduler(&self, resource: &str) -> Result<&Arc<RefreshScheduler>> {
        resource
            .parse::<ResourceKind>()
            .ok()
            .and_then(|kind| self.views.get(&kind))
            .ok_or_else(|| DashboardError::NotFound(format!("View {} not configured", resource)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewSummary {
    pub resource: ResourceKind,
    pub identifier: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub applied: bool,
    pub generation: u64,
    pub snapshot: ViewSnapshot,
}

pub fn dashboard_router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/views", get(list_views))
        .route("/views/:resource", get(get_view))
        .route("/views/:resource/refresh", post(refresh_view))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn prometheus_metrics() -> Result<impl IntoResponse> {
    let body = metrics::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

async fn list_views(State(state): State<DashboardState>) -> Json<Vec<ViewSummary>> {
    let mut views: Vec<ViewSummary> = state
        .views
        .values()
        .map(|s| ViewSummary {
            resource: s.view().resource,
            identifier: s.view().identifier.clone(),
            title: s.view().descriptor().title.to_string(),
        })
        .collect();
    views.sort_by_key(|v| v.resource.as_str());
    Json(views)
}

async fn get_view(
    State(state): State<DashboardState>,
    Path(resource): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    Ok(Json(state.scheduler(&resource)?.snapshot()))
}

async fn refresh_view(
    State(state): State<DashboardState>,
    Path(resource): Path<String>,
) -> Result<Json<RefreshResponse>> {
    info!("Manual refresh requested: {}", resource);
    let scheduler = state.scheduler(&resource)?;

    let (applied, generation) = match scheduler.refresh().await? {
        RefreshOutcome::Applied { generation } => (true, generation),
        RefreshOutcome::Stale { generation } => (false, generation),
    };

    Ok(Json(RefreshResponse {
        applied,
        generation,
        snapshot: scheduler.snapshot(),
    }))
}

/// Serves the dashboard until `shutdown` resolves.
pub async fn serve(
    port: u16,
    state: DashboardState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = dashboard_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting dashboard on {}", addr);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DashboardError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| DashboardError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
