use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::VehicleEntry;
use crate::models::RouteStop;

/// Read-only source of valid vehicle identifiers and their ordered route
/// stops. The tracking core never caches this data internally; it is
/// fetched per call.
#[async_trait]
pub trait VehicleDirectory: Send + Sync {
    async fn vehicle_exists(&self, vehicle_id: &str) -> bool;

    /// Ordered stop list for a vehicle's route, or None when the vehicle
    /// is unknown.
    async fn route_stops(&self, vehicle_id: &str) -> Option<Vec<RouteStop>>;
}

/// Directory backed by the `vehicles` section of the configuration file.
pub struct ConfigDirectory {
    vehicles: HashMap<String, Vec<RouteStop>>,
}

impl ConfigDirectory {
    pub fn from_entries(entries: &[VehicleEntry]) -> Self {
        let vehicles = entries
            .iter()
            .map(|entry| {
                let stops = entry
                    .stops
                    .iter()
                    .enumerate()
                    .map(|(i, stop)| RouteStop {
                        id: stop.id.clone(),
                        name: stop.name.clone(),
                        latitude: stop.latitude,
                        longitude: stop.longitude,
                        sequence: i as u32,
                    })
                    .collect();
                (entry.id.clone(), stops)
            })
            .collect();
        Self { vehicles }
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }
}

#[async_trait]
impl VehicleDirectory for ConfigDirectory {
    async fn vehicle_exists(&self, vehicle_id: &str) -> bool {
        self.vehicles.contains_key(vehicle_id)
    }

    async fn route_stops(&self, vehicle_id: &str) -> Option<Vec<RouteStop>> {
        self.vehicles.get(vehicle_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StopEntry;

    fn make_entries() -> Vec<VehicleEntry> {
        vec![VehicleEntry {
            id: "BUS-001".to_string(),
            name: Some("Morning Express".to_string()),
            stops: vec![
                StopEntry {
                    id: "STOP-02".to_string(),
                    name: "Market".to_string(),
                    latitude: 12.975,
                    longitude: 77.60,
                },
                StopEntry {
                    id: "STOP-01".to_string(),
                    name: "Depot".to_string(),
                    latitude: 12.9716,
                    longitude: 77.5946,
                },
            ],
        }]
    }

    #[tokio::test]
    async fn test_lookup_and_stop_order_preserved() {
        let directory = ConfigDirectory::from_entries(&make_entries());

        assert!(directory.vehicle_exists("BUS-001").await);
        assert!(!directory.vehicle_exists("BUS-002").await);

        // Stops keep the configured order, not a sorted one
        let stops = directory.route_stops("BUS-001").await.unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].id, "STOP-02");
        assert_eq!(stops[0].sequence, 0);
        assert_eq!(stops[1].id, "STOP-01");
        assert_eq!(stops[1].sequence, 1);

        assert!(directory.route_stops("BUS-002").await.is_none());
    }
}
