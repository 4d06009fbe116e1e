use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::{AppState, ErrorResponse};
use crate::models::{PositionRecord, PositionReport};
use crate::services::ingest::IngestError;

/// A position record plus its derived online flag
#[derive(Debug, Serialize, ToSchema)]
pub struct VehicleStatus {
    #[serde(flatten)]
    pub record: PositionRecord,
    /// False once the report is older than the offline threshold
    pub online: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationListResponse {
    pub vehicles: Vec<VehicleStatus>,
    pub count: usize,
    pub timestamp: String,
}

/// Ingest one position report from a device or driver app
#[utoipa::path(
    post,
    path = "/api/vehicles/{vehicle_id}/position",
    request_body = PositionReport,
    params(("vehicle_id" = String, Path, description = "Vehicle identifier")),
    responses(
        (status = 200, description = "Report accepted; stored record returned", body = PositionRecord),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "Unknown vehicle", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn report_position(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Json(report): Json<PositionReport>,
) -> Response {
    match state.ingest.ingest(&vehicle_id, report).await {
        Ok(record) => Json(record).into_response(),
        Err(e @ IngestError::UnknownVehicle(_)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// List the last known position of every vehicle
#[utoipa::path(
    get,
    path = "/api/vehicles/locations",
    responses(
        (status = 200, description = "All live position records", body = LocationListResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_locations(State(state): State<AppState>) -> Json<LocationListResponse> {
    let now = Utc::now();
    let vehicles: Vec<VehicleStatus> = state
        .locations
        .all_locations()
        .await
        .into_iter()
        .map(|record| VehicleStatus {
            online: record.is_online(state.offline_threshold, now),
            record,
        })
        .collect();

    Json(LocationListResponse {
        count: vehicles.len(),
        vehicles,
        timestamp: now.to_rfc3339(),
    })
}

/// Last known position of one vehicle
#[utoipa::path(
    get,
    path = "/api/vehicles/{vehicle_id}/location",
    params(("vehicle_id" = String, Path, description = "Vehicle identifier")),
    responses(
        (status = 200, description = "Live position record", body = VehicleStatus),
        (status = 404, description = "No recent position", body = ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn get_location(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Response {
    match state.locations.get_location(&vehicle_id).await {
        Some(record) => Json(VehicleStatus {
            online: record.is_online(state.offline_threshold, Utc::now()),
            record,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "no recent position for vehicle {vehicle_id}"
            ))),
        )
            .into_response(),
    }
}

/// Drop the cached position of one vehicle
#[utoipa::path(
    delete,
    path = "/api/vehicles/{vehicle_id}/location",
    params(("vehicle_id" = String, Path, description = "Vehicle identifier")),
    responses((status = 204, description = "Cached position removed")),
    tag = "vehicles"
)]
pub async fn delete_location(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> StatusCode {
    state.locations.delete_location(&vehicle_id).await;
    StatusCode::NO_CONTENT
}
