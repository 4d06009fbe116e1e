use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::cache::CacheManager;
use crate::models::{PositionRecord, PositionReport, PositionSource};

/// Reserved key namespace isolating position records from other cache users
const KEY_PREFIX: &str = "vehicle:location:";

/// Domain layer over the shared cache holding the last known position of
/// each vehicle.
///
/// One record per vehicle id; every write replaces the previous record and
/// refreshes the fixed TTL, which bounds how long a silent vehicle still
/// appears "recently seen". The online/offline flag is a separate,
/// threshold-based derivation done by callers.
#[derive(Clone)]
pub struct LocationStore {
    cache: Arc<CacheManager>,
    ttl_secs: u64,
}

impl LocationStore {
    pub fn new(cache: Arc<CacheManager>, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }

    fn key(vehicle_id: &str) -> String {
        format!("{KEY_PREFIX}{vehicle_id}")
    }

    /// Build the stored record from a validated report and write it
    /// through, stamping `cached_at`. Returns the record as stored.
    pub async fn set_location(&self, vehicle_id: &str, report: &PositionReport) -> PositionRecord {
        let now = Utc::now();
        let record = PositionRecord {
            vehicle_id: vehicle_id.to_string(),
            latitude: report.latitude,
            longitude: report.longitude,
            speed: normalize_speed(report.speed),
            heading: report.heading.map(normalize_heading),
            source: report.source.unwrap_or(PositionSource::Device),
            captured_at: report.captured_at.unwrap_or(now),
            cached_at: now,
        };
        self.store(&record).await;
        record
    }

    /// Write an already-built record, refreshing its TTL.
    pub async fn store(&self, record: &PositionRecord) {
        // Serialization of our own types cannot fail for valid floats;
        // guard anyway so a bad record never poisons the write path.
        match serde_json::to_string(record) {
            Ok(json) => {
                self.cache
                    .set(&Self::key(&record.vehicle_id), &json, self.ttl_secs)
                    .await;
            }
            Err(e) => {
                warn!(vehicle_id = %record.vehicle_id, error = %e, "Failed to serialize position record");
            }
        }
    }

    pub async fn get_location(&self, vehicle_id: &str) -> Option<PositionRecord> {
        let json = self.cache.get(&Self::key(vehicle_id)).await?;
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(vehicle_id, error = %e, "Dropping corrupt position record");
                None
            }
        }
    }

    /// All live position records. A record that fails to parse is skipped,
    /// never fatal to the whole scan.
    pub async fn all_locations(&self) -> Vec<PositionRecord> {
        let mut records = Vec::new();
        for json in self.cache.scan_prefix(KEY_PREFIX).await {
            match serde_json::from_str::<PositionRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupt position record in scan");
                }
            }
        }
        records
    }

    pub async fn delete_location(&self, vehicle_id: &str) {
        self.cache.delete(&Self::key(vehicle_id)).await;
    }
}

fn normalize_speed(speed: Option<f64>) -> f64 {
    match speed {
        Some(s) if s.is_finite() => s.max(0.0),
        _ => 0.0,
    }
}

fn normalize_heading(heading: f64) -> f64 {
    if heading.is_finite() {
        heading.rem_euclid(360.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use chrono::Duration;

    async fn make_store() -> (LocationStore, Arc<CacheManager>) {
        let cache = Arc::new(CacheManager::connect(&CacheConfig::default()).await);
        (LocationStore::new(Arc::clone(&cache), 300), cache)
    }

    fn make_report() -> PositionReport {
        PositionReport {
            latitude: 12.9716,
            longitude: 77.5946,
            speed: Some(35.0),
            heading: Some(90.0),
            source: Some(PositionSource::DriverApp),
            captured_at: None,
        }
    }

    #[tokio::test]
    async fn test_write_then_read_matches_input() {
        let (store, _cache) = make_store().await;

        let stored = store.set_location("BUS-001", &make_report()).await;
        let read = store.get_location("BUS-001").await.unwrap();

        assert_eq!(read.vehicle_id, "BUS-001");
        assert_eq!(read.latitude, 12.9716);
        assert_eq!(read.longitude, 77.5946);
        assert_eq!(read.speed, 35.0);
        assert_eq!(read.heading, Some(90.0));
        assert_eq!(read.source, PositionSource::DriverApp);
        assert_eq!(read.captured_at, stored.captured_at);
        assert_eq!(read.cached_at, stored.cached_at);
    }

    #[tokio::test]
    async fn test_missing_vehicle_is_absent_not_an_error() {
        let (store, _cache) = make_store().await;
        assert!(store.get_location("BUS-404").await.is_none());
    }

    #[tokio::test]
    async fn test_record_expires_after_ttl() {
        let (store, cache) = make_store().await;
        store.set_location("BUS-001", &make_report()).await;

        let key = format!("{KEY_PREFIX}BUS-001");
        let now = Utc::now();
        assert!(cache
            .memory()
            .get_at(&key, now + Duration::seconds(299))
            .is_some());
        assert!(cache
            .memory()
            .get_at(&key, now + Duration::seconds(301))
            .is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_skipped_in_scan() {
        let (store, cache) = make_store().await;
        store.set_location("BUS-001", &make_report()).await;
        cache
            .set(&format!("{KEY_PREFIX}BUS-999"), "not json {", 300)
            .await;

        let records = store.all_locations().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vehicle_id, "BUS-001");
        assert!(store.get_location("BUS-999").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let (store, _cache) = make_store().await;
        store.set_location("BUS-001", &make_report()).await;

        store.delete_location("BUS-001").await;

        assert!(store.get_location("BUS-001").await.is_none());
        assert!(store.all_locations().await.is_empty());
    }

    #[test]
    fn test_speed_and_heading_normalization() {
        assert_eq!(normalize_speed(Some(-5.0)), 0.0);
        assert_eq!(normalize_speed(Some(f64::NAN)), 0.0);
        assert_eq!(normalize_speed(None), 0.0);
        assert_eq!(normalize_speed(Some(42.5)), 42.5);

        assert_eq!(normalize_heading(370.0), 10.0);
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(359.9), 359.9);
    }
}
