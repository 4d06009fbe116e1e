/// ETA prediction
///
/// Derives time-to-arrival estimates from a vehicle's last known position
/// using great-circle distance and a synthetic time-of-day traffic model.
/// Everything here is a pure function of its inputs; no state is kept
/// between requests.
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{PositionRecord, RouteStop};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Speed a bus "normally" travels at; confidence decays as the reported
/// speed diverges from it.
const NORMAL_SPEED_KMH: f64 = 30.0;

/// A single arrival-time prediction
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EtaPrediction {
    /// Predicted travel time in seconds, traffic-adjusted
    pub eta_seconds: f64,
    /// Predicted arrival instant
    pub eta_timestamp: DateTime<Utc>,
    /// Great-circle distance to the destination in meters
    pub distance_meters: f64,
    /// Heuristic confidence in (0, 1]; lower for distant targets and
    /// unusual speeds
    pub confidence: f64,
}

/// Per-stop prediction within a route, in route order
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopEta {
    pub stop_id: String,
    pub stop_name: String,
    pub sequence: u32,
    /// False when the vehicle has no live position; `eta` is then absent
    pub available: bool,
    pub eta: Option<EtaPrediction>,
}

/// Traffic multiplier for one upcoming hour
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrafficSlot {
    /// Hours from now (0 = current hour)
    pub hour_offset: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EtaEngine {
    /// Floor applied to reported speeds so a stationary vehicle still
    /// yields a finite ETA
    pub minimum_speed_kmh: f64,
}

impl EtaEngine {
    pub fn new(minimum_speed_kmh: f64) -> Self {
        Self { minimum_speed_kmh }
    }

    /// Predict arrival at a destination point from a current position and
    /// reported speed (km/h).
    pub fn predict(
        &self,
        latitude: f64,
        longitude: f64,
        dest_latitude: f64,
        dest_longitude: f64,
        speed_kmh: f64,
        now: DateTime<Utc>,
    ) -> EtaPrediction {
        let distance_meters =
            haversine_distance_m(latitude, longitude, dest_latitude, dest_longitude);
        let effective_kmh = speed_kmh.max(self.minimum_speed_kmh);
        let base_seconds = distance_meters / (effective_kmh / 3.6);
        let eta_seconds = base_seconds * traffic_multiplier(now.with_timezone(&Local).hour());

        EtaPrediction {
            eta_seconds,
            eta_timestamp: now + Duration::milliseconds((eta_seconds * 1000.0) as i64),
            distance_meters,
            confidence: confidence(distance_meters, speed_kmh),
        }
    }

    /// Independent predictions for every stop of a route, in route order.
    /// A vehicle with no live position yields unavailable entries instead
    /// of failing.
    pub fn predict_route(
        &self,
        position: Option<&PositionRecord>,
        stops: &[RouteStop],
        now: DateTime<Utc>,
    ) -> Vec<StopEta> {
        stops
            .iter()
            .map(|stop| match position {
                Some(record) => StopEta {
                    stop_id: stop.id.clone(),
                    stop_name: stop.name.clone(),
                    sequence: stop.sequence,
                    available: true,
                    eta: Some(self.predict(
                        record.latitude,
                        record.longitude,
                        stop.latitude,
                        stop.longitude,
                        record.speed,
                        now,
                    )),
                },
                None => StopEta {
                    stop_id: stop.id.clone(),
                    stop_name: stop.name.clone(),
                    sequence: stop.sequence,
                    available: false,
                    eta: None,
                },
            })
            .collect()
    }
}

/// Great-circle distance in meters (haversine formula)
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Synthetic congestion multiplier for an hour of day, bounded to
/// [1.0, 1.8]. Morning and evening rush push travel times up; nights are
/// free-flowing.
pub fn traffic_multiplier(hour: u32) -> f64 {
    match hour % 24 {
        0..=5 => 1.0,
        6 => 1.2,
        7..=9 => 1.6,
        10..=12 => 1.3,
        13..=16 => 1.25,
        17..=19 => 1.8,
        20..=21 => 1.3,
        _ => 1.1,
    }
}

/// Multipliers for the current hour and the five following ones, purely
/// derived from the clock.
pub fn traffic_forecast(from_hour: u32) -> Vec<TrafficSlot> {
    (0..6)
        .map(|offset| TrafficSlot {
            hour_offset: offset,
            multiplier: traffic_multiplier(from_hour + offset),
        })
        .collect()
}

/// Current local hour, the engine's notion of "now" for congestion
pub fn current_hour() -> u32 {
    Local::now().hour()
}

/// Prediction confidence in (0, 1]: decreases monotonically with distance
/// and with how far the reported speed sits from the normal range.
fn confidence(distance_meters: f64, speed_kmh: f64) -> f64 {
    let distance_factor = 1.0 / (1.0 + distance_meters / 20_000.0);
    let divergence = (speed_kmh - NORMAL_SPEED_KMH).abs();
    let speed_factor = 1.0 / (1.0 + divergence / 40.0);
    distance_factor * speed_factor
}
