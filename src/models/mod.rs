use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a position report originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Device,
    Manual,
    DriverApp,
}

impl Default for PositionSource {
    fn default() -> Self {
        PositionSource::Device
    }
}

/// An inbound position report as submitted by a device or driver app
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PositionReport {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Speed in km/h. Negative or missing values are clamped to 0.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Heading in degrees. Normalized into [0, 360).
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub source: Option<PositionSource>,
    /// Timestamp assigned by the reporter. Defaults to receive time.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

/// Last known position of a vehicle. At most one live record exists per
/// vehicle id; a new report replaces the previous record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionRecord {
    /// Stable vehicle identifier (e.g. "BUS-001")
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in km/h, never negative
    pub speed: f64,
    /// Heading in degrees within [0, 360), if reported
    pub heading: Option<f64>,
    pub source: PositionSource,
    /// Timestamp assigned by the reporter
    pub captured_at: DateTime<Utc>,
    /// Timestamp assigned by the location store on write
    pub cached_at: DateTime<Utc>,
}

impl PositionRecord {
    /// Whether the record is fresh enough to show the vehicle as online.
    /// Derived from report age, never stored.
    pub fn is_online(&self, offline_threshold: Duration, now: DateTime<Utc>) -> bool {
        now - self.captured_at <= offline_threshold
    }
}

/// A stop on a vehicle's route, in route order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RouteStop {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Position of the stop within the route, starting at 0
    pub sequence: u32,
}
