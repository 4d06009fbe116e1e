use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::{AppState, ErrorResponse};
use crate::services::eta::{self, EtaPrediction, StopEta, TrafficSlot};

#[derive(Debug, Deserialize, IntoParams)]
pub struct EtaQuery {
    /// Destination latitude in decimal degrees
    pub lat: f64,
    /// Destination longitude in decimal degrees
    pub lon: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EtaResponse {
    pub vehicle_id: String,
    pub prediction: EtaPrediction,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteEtaResponse {
    pub vehicle_id: String,
    /// False when the vehicle has no live position; per-stop entries are
    /// then all unavailable
    pub available: bool,
    pub stops: Vec<StopEta>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrafficForecastResponse {
    pub forecast: Vec<TrafficSlot>,
    pub timestamp: String,
}

/// Predict arrival of a vehicle at an arbitrary point
#[utoipa::path(
    get,
    path = "/api/vehicles/{vehicle_id}/eta",
    params(
        ("vehicle_id" = String, Path, description = "Vehicle identifier"),
        EtaQuery
    ),
    responses(
        (status = 200, description = "Traffic-adjusted arrival prediction", body = EtaResponse),
        (status = 400, description = "Invalid destination", body = ErrorResponse),
        (status = 404, description = "No recent position for the vehicle", body = ErrorResponse)
    ),
    tag = "eta"
)]
pub async fn predict_eta(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Query(query): Query<EtaQuery>,
) -> Response {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lon) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("destination coordinates out of range")),
        )
            .into_response();
    }

    match state.locations.get_location(&vehicle_id).await {
        Some(record) => {
            let prediction = state.eta.predict(
                record.latitude,
                record.longitude,
                query.lat,
                query.lon,
                record.speed,
                Utc::now(),
            );
            Json(EtaResponse {
                vehicle_id,
                prediction,
            })
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "no recent position for vehicle {vehicle_id}"
            ))),
        )
            .into_response(),
    }
}

/// Predict arrival at every stop of the vehicle's route, in route order
#[utoipa::path(
    get,
    path = "/api/vehicles/{vehicle_id}/route-eta",
    params(("vehicle_id" = String, Path, description = "Vehicle identifier")),
    responses(
        (status = 200, description = "Per-stop predictions in route order", body = RouteEtaResponse),
        (status = 404, description = "Unknown vehicle", body = ErrorResponse)
    ),
    tag = "eta"
)]
pub async fn route_eta(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Response {
    let Some(stops) = state.directory.route_stops(&vehicle_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("unknown vehicle: {vehicle_id}"))),
        )
            .into_response();
    };

    // An offline vehicle yields one unavailable entry per stop, never an error
    let position = state.locations.get_location(&vehicle_id).await;
    let now = Utc::now();
    let per_stop = state.eta.predict_route(position.as_ref(), &stops, now);

    Json(RouteEtaResponse {
        vehicle_id,
        available: position.is_some(),
        stops: per_stop,
        timestamp: now.to_rfc3339(),
    })
    .into_response()
}

/// Traffic multipliers for the next six hours
#[utoipa::path(
    get,
    path = "/api/traffic/forecast",
    responses(
        (status = 200, description = "Hourly congestion multipliers", body = TrafficForecastResponse)
    ),
    tag = "eta"
)]
pub async fn get_traffic_forecast() -> Json<TrafficForecastResponse> {
    Json(TrafficForecastResponse {
        forecast: eta::traffic_forecast(eta::current_hour()),
        timestamp: Utc::now().to_rfc3339(),
    })
}
