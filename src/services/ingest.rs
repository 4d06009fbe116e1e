use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{PositionRecord, PositionReport};
use crate::services::directory::VehicleDirectory;
use crate::services::locations::LocationStore;

/// An accepted position report, republished to all live subscribers
#[derive(Debug, Clone, Serialize)]
pub struct PositionEvent {
    pub vehicle_id: String,
    pub record: PositionRecord,
}

/// Sender for accepted-position notifications
pub type PositionEventSender = broadcast::Sender<PositionEvent>;

/// Validation failures rejected before anything is written or broadcast
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("latitude {0} outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("unknown vehicle: {0}")]
    UnknownVehicle(String),
}

/// Accepts inbound position reports: validates, normalizes, writes through
/// the location store and republishes to subscribers.
pub struct IngestService {
    locations: LocationStore,
    directory: Arc<dyn VehicleDirectory>,
    updates_tx: PositionEventSender,
}

impl IngestService {
    pub fn new(
        locations: LocationStore,
        directory: Arc<dyn VehicleDirectory>,
        updates_tx: PositionEventSender,
    ) -> Self {
        Self {
            locations,
            directory,
            updates_tx,
        }
    }

    /// Process one report. Hard violations (bad coordinates, unknown
    /// vehicle) reject the report; soft ones (negative speed, heading out
    /// of range) are clamped by the store. Reports are not deduplicated:
    /// identical content overwrites and broadcasts again, and a report
    /// whose captured_at is older than the stored record's still wins by
    /// arrival order.
    pub async fn ingest(
        &self,
        vehicle_id: &str,
        report: PositionReport,
    ) -> Result<PositionRecord, IngestError> {
        if !report.latitude.is_finite() || !(-90.0..=90.0).contains(&report.latitude) {
            return Err(IngestError::InvalidLatitude(report.latitude));
        }
        if !report.longitude.is_finite() || !(-180.0..=180.0).contains(&report.longitude) {
            return Err(IngestError::InvalidLongitude(report.longitude));
        }
        if !self.directory.vehicle_exists(vehicle_id).await {
            return Err(IngestError::UnknownVehicle(vehicle_id.to_string()));
        }

        let record = self.locations.set_location(vehicle_id, &report).await;

        // Fire-and-forget: delivery failures or absent subscribers must
        // never affect ingestion.
        let delivered = self
            .updates_tx
            .send(PositionEvent {
                vehicle_id: vehicle_id.to_string(),
                record: record.clone(),
            })
            .unwrap_or(0);
        debug!(
            vehicle_id,
            subscribers = delivered,
            "Position report accepted"
        );

        Ok(record)
    }
}

/// Build the process-wide broadcast channel for accepted positions.
pub fn position_channel(capacity: usize) -> PositionEventSender {
    let (tx, _rx) = broadcast::channel(capacity);
    info!(capacity, "Position broadcast channel ready");
    tx
}
