use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::CircuitStatus;
use crate::routing::RouteDefinition;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub snapshot_version: u64,
    pub route_count: usize,
    pub source: String,
}

#[derive(Serialize)]
pub struct RoutesResponse {
    pub version: u64,
    pub routes: Vec<RouteDefinition>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.store.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        snapshot_version: snapshot.version(),
        route_count: snapshot.len(),
        source: state.store.source().describe(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<RoutesResponse> {
    let snapshot = state.store.snapshot();
    Json(RoutesResponse {
        version: snapshot.version(),
        routes: snapshot.definitions(),
    })
}

pub async fn reload_routes(State(state): State<AdminState>) -> impl IntoResponse {
    match state.store.reload().await {
        Ok(version) => (StatusCode::OK, Json(json!({ "version": version }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

pub async fn get_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitStatus>> {
    Json(state.breakers.statuses())
}
