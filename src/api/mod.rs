pub mod auth;
pub mod eta;
pub mod system;
pub mod vehicles;
pub mod ws;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::cache::revocation::RevocationLedger;
use crate::cache::CacheManager;
use crate::services::directory::VehicleDirectory;
use crate::services::eta::EtaEngine;
use crate::services::ingest::{IngestService, PositionEventSender};
use crate::services::locations::LocationStore;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub locations: LocationStore,
    pub ingest: Arc<IngestService>,
    pub directory: Arc<dyn VehicleDirectory>,
    pub eta: EtaEngine,
    pub revocations: RevocationLedger,
    pub updates_tx: PositionEventSender,
    /// Records older than this are shown as offline
    pub offline_threshold: chrono::Duration,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/vehicles/locations", get(vehicles::list_locations))
        .route(
            "/vehicles/{vehicle_id}/position",
            post(vehicles::report_position),
        )
        .route(
            "/vehicles/{vehicle_id}/location",
            get(vehicles::get_location).delete(vehicles::delete_location),
        )
        .route("/vehicles/{vehicle_id}/eta", get(eta::predict_eta))
        .route("/vehicles/{vehicle_id}/route-eta", get(eta::route_eta))
        .route("/traffic/forecast", get(eta::get_traffic_forecast))
        .route("/auth/logout", post(auth::logout))
        .route("/system/health", get(system::health))
        .route("/ws", get(ws::ws_positions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            reject_revoked_tokens,
        ))
        .with_state(state)
}

/// Consults the revocation ledger on every request carrying a Bearer
/// token. Credential verification itself happens upstream; this layer only
/// guarantees a logged-out token stops working immediately.
async fn reject_revoked_tokens(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request) {
        if state.revocations.is_revoked(&token).await {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("token has been revoked")),
            )
                .into_response();
        }
    }
    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}
