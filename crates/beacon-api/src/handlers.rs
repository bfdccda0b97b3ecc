//! HTTP API handlers — exposes registry state as JSON.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use beacon_services::{MonitorView, Phase, PhaseCounts, Registry};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            started_at: Instant::now(),
        }
    }
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub monitors: PhaseCounts,
    /// Monitors whose last reported status is an alerting one.
    pub alerting: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let now = Instant::now();
    let alerting = state
        .registry
        .views(now)
        .iter()
        .filter(|v| v.alerting)
        .count();

    Json(StatusResponse {
        uptime_secs: now.saturating_duration_since(state.started_at).as_secs(),
        monitors: state.registry.counts(),
        alerting,
    })
}

// ── /endpoints ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EndpointsQuery {
    /// Only endpoints that are not online.
    #[serde(default)]
    pub down: bool,
}

#[derive(Debug, Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<MonitorView>,
}

pub async fn handle_endpoints(
    State(state): State<ApiState>,
    Query(query): Query<EndpointsQuery>,
) -> Json<EndpointsResponse> {
    let mut endpoints = state.registry.views(Instant::now());
    if query.down {
        endpoints.retain(|v| v.phase != Phase::Online);
    }
    Json(EndpointsResponse { endpoints })
}
