//! Tracker HTTP routes: JSON views over the `DeployTracker` queries.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::models::Environment;
use crate::services::enrichment::RecordFailure;
use crate::services::DeployTracker;

/// Shared state for tracker route handlers.
#[derive(Clone)]
pub struct TrackerRouterState {
    pub tracker: Arc<DeployTracker>,
}

/// Build the tracker's Axum router.
pub fn tracker_router(state: TrackerRouterState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/builds", get(list_builds))
        .route("/api/environments/{env}", get(environment_overview))
        .route("/api/environments/{env}/coordination", get(coordination_state))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Rate limiting anywhere in the batch surfaces as 429. Other failures only
/// fail the request when nothing could be produced.
fn status_for(failures: &[RecordFailure], produced_nothing: bool) -> StatusCode {
    if failures.iter().any(|f| f.rate_limited) {
        StatusCode::TOO_MANY_REQUESTS
    } else if !failures.is_empty() && produced_nothing {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn parse_environment(raw: &str) -> Result<Environment, Response> {
    raw.parse::<Environment>().map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e })).into_response()
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_builds(State(state): State<TrackerRouterState>) -> Response {
    let report = state.tracker.enriched_builds().await;
    let status = status_for(&report.failures, report.builds.is_empty());
    (status, Json(report)).into_response()
}

async fn environment_overview(
    State(state): State<TrackerRouterState>,
    Path(env): Path<String>,
) -> Response {
    let environment = match parse_environment(&env) {
        Ok(environment) => environment,
        Err(response) => return response,
    };
    let overview = state.tracker.environment_overview(environment).await;
    let nothing = overview.components.iter().all(|c| c.deployment.is_none());
    let status = status_for(&overview.failures, nothing);
    (status, Json(overview)).into_response()
}

async fn coordination_state(
    State(state): State<TrackerRouterState>,
    Path(env): Path<String>,
) -> Response {
    let environment = match parse_environment(&env) {
        Ok(environment) => environment,
        Err(response) => return response,
    };
    let report = state.tracker.coordination_state(environment).await;
    let status = status_for(&report.failures, false);
    (status, Json(report)).into_response()
}
