use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::cache::CacheMode;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Which cache backend currently serves operations. Memory fallback
    /// means cached data will not survive a process restart.
    pub cache_mode: CacheMode,
    /// Vehicles with a live cached position
    pub live_vehicles: usize,
    pub timestamp: String,
}

/// Service health and cache backend mode
#[utoipa::path(
    get,
    path = "/api/system/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let live_vehicles = state.locations.all_locations().await.len();
    Json(HealthResponse {
        status: "ok",
        cache_mode: state.cache.mode(),
        live_vehicles,
        timestamp: Utc::now().to_rfc3339(),
    })
}
