use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// An in-memory cache entry carrying its own absolute expiry, since the
/// backing map has no native TTL support.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent in-memory key-value store with per-entry expiry.
///
/// Serves as the fallback backend when the networked cache is unreachable,
/// and as a write-through first tier when it is. Expiry is enforced lazily
/// on every lookup; the periodic sweep only bounds memory, it is not needed
/// for correctness.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        self.set_at(key, value, ttl, Utc::now());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// All live values whose key starts with `prefix`. Order is unspecified.
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.scan_prefix_at(prefix, Utc::now())
    }

    /// Remove expired entries, returning how many were dropped. Holds only
    /// shard-level locks, never the whole map.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn set_at(&self, key: &str, value: String, ttl: Duration, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
            // Drop the shard guard before removing to avoid deadlock
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    pub(crate) fn scan_prefix_at(&self, prefix: &str, now: DateTime<Utc>) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect()
    }

    pub(crate) fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_within_ttl() {
        let store = MemoryStore::new();
        store.set("k1", "v1".to_string(), Duration::seconds(300));

        assert_eq!(store.get("k1"), Some("v1".to_string()));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_entry_absent_after_ttl_elapses() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.set_at("k1", "v1".to_string(), Duration::seconds(300), now);

        // Visible right up to the boundary, gone at and after it
        assert!(store
            .get_at("k1", now + Duration::seconds(299))
            .is_some());
        assert!(store.get_at("k1", now + Duration::seconds(301)).is_none());
        // Lazy expiry removed the entry
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_write_replaces_and_refreshes_ttl() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.set_at("k1", "old".to_string(), Duration::seconds(10), now);
        store.set_at(
            "k1",
            "new".to_string(),
            Duration::seconds(300),
            now + Duration::seconds(5),
        );

        // Past the original expiry but within the refreshed one
        assert_eq!(
            store.get_at("k1", now + Duration::seconds(60)),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_scan_prefix_skips_expired_and_foreign_keys() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.set_at("loc:a", "1".to_string(), Duration::seconds(300), now);
        store.set_at("loc:b", "2".to_string(), Duration::seconds(10), now);
        store.set_at("other:c", "3".to_string(), Duration::seconds(300), now);

        let mut live: Vec<String> = store
            .scan_prefix_at("loc:", now + Duration::seconds(60))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        live.sort();

        assert_eq!(live, vec!["loc:a".to_string()]);
    }

    #[test]
    fn test_purge_removes_only_expired_entries() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.set_at("a", "1".to_string(), Duration::seconds(30), now);
        store.set_at("b", "2".to_string(), Duration::seconds(300), now);

        let dropped = store.purge_expired_at(now + Duration::seconds(60));

        assert_eq!(dropped, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_at("b", now + Duration::seconds(60)).is_some());
    }
}
