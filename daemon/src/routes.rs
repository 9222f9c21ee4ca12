//! HTTP route handlers for the TaskPulse status surface.
//!
//! Three read-only JSON endpoints with permissive CORS:
//!
//! - `GET /health` - scheduler health, uptime, and counters (503 when
//!   unhealthy)
//! - `GET /analytics` - forwarded analytics snapshot
//! - `GET /progress` - forwarded progress report
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`]: the
//! orchestrator handle for forwarded payloads and the scheduler status
//! for health reporting.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use taskpulse_engine::Orchestrator;
use tower_http::cors::CorsLayer;
use tracing::trace;

use crate::scheduler::{SchedulerStatus, StatusSnapshot};

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine entry point for forwarded payloads.
    pub orchestrator: Arc<Orchestrator>,

    /// Scheduler counters and health.
    pub status: Arc<SchedulerStatus>,
}

impl AppState {
    /// Creates the shared state.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, status: Arc<SchedulerStatus>) -> Self {
        Self {
            orchestrator,
            status,
        }
    }
}

/// Creates the application router with all routes configured.
///
/// CORS is permissive: the surface is read-only and local dashboards load
/// it from arbitrary origins.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/analytics", get(get_analytics))
        .route("/progress", get(get_progress))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Response body for the health endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` when healthy, `"unhealthy"` otherwise.
    pub status: String,

    #[serde(flatten)]
    pub scheduler: StatusSnapshot,
}

/// GET /health - scheduler health and counters.
///
/// Returns 200 while healthy and 503 after an initialization failure,
/// with the same body shape either way.
async fn get_health(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();
    trace!(?snapshot, "health requested");

    let (code, label) = if snapshot.healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status: label.to_string(),
            scheduler: snapshot,
        }),
    )
        .into_response()
}

/// GET /analytics - forwarded analytics snapshot.
async fn get_analytics(State(state): State<AppState>) -> Response {
    Json(state.orchestrator.analytics_snapshot().await).into_response()
}

/// GET /progress - forwarded progress report.
async fn get_progress(State(state): State<AppState>) -> Response {
    Json(state.orchestrator.generate_progress_report().await).into_response()
}
