use std::sync::Arc;

use tracing::debug;

use super::CacheManager;

const KEY_PREFIX: &str = "auth:revoked:";

/// Ledger of authentication tokens invalidated before their natural expiry.
///
/// A thin key-prefix partition of the shared cache. Entries are written
/// with the token's remaining lifetime as TTL, so the ledger disappears
/// exactly when the tokens would have expired anyway and never grows
/// unbounded. Because cache writes go through the memory tier, a token
/// revoked while the backend was degraded stays revoked for the rest of
/// this process's lifetime.
#[derive(Clone)]
pub struct RevocationLedger {
    cache: Arc<CacheManager>,
}

impl RevocationLedger {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// Mark a token invalid for `ttl_secs`, the token's remaining natural
    /// lifetime, never longer. A zero lifetime means the token is already
    /// expired and nothing is recorded for it.
    pub async fn revoke(&self, token: &str, ttl_secs: u64) {
        self.cache
            .set(&format!("{KEY_PREFIX}{token}"), "1", ttl_secs)
            .await;
        debug!(ttl_secs, "Token revoked");
    }

    /// Consulted on every authenticated request.
    pub async fn is_revoked(&self, token: &str) -> bool {
        self.cache
            .get(&format!("{KEY_PREFIX}{token}"))
            .await
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use chrono::{Duration, Utc};

    async fn make_ledger() -> (RevocationLedger, Arc<CacheManager>) {
        let cache = Arc::new(CacheManager::connect(&CacheConfig::default()).await);
        (RevocationLedger::new(Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn test_revoked_token_is_reported_revoked() {
        let (ledger, _cache) = make_ledger().await;

        assert!(!ledger.is_revoked("tok-1").await);
        ledger.revoke("tok-1", 60).await;
        assert!(ledger.is_revoked("tok-1").await);
        // Other tokens are unaffected
        assert!(!ledger.is_revoked("tok-2").await);
    }

    #[tokio::test]
    async fn test_revocation_expires_with_the_token() {
        let (ledger, cache) = make_ledger().await;
        ledger.revoke("tok-1", 60).await;

        let key = format!("{KEY_PREFIX}tok-1");
        let now = Utc::now();
        assert!(cache
            .memory()
            .get_at(&key, now + Duration::seconds(59))
            .is_some());
        assert!(cache
            .memory()
            .get_at(&key, now + Duration::seconds(61))
            .is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_revocation_is_a_noop_and_keeps_the_backend() {
        use crate::cache::backend::testing::FlakyBackend;
        use crate::cache::CacheMode;

        let backend = Arc::new(FlakyBackend::new());
        let cache = Arc::new(CacheManager::with_backend(
            backend,
            std::time::Duration::from_millis(100),
        ));
        let ledger = RevocationLedger::new(Arc::clone(&cache));

        // An expired token needs no ledger entry, and the write that
        // Redis would reject must not degrade the shared cache.
        ledger.revoke("tok-edge", 0).await;

        assert!(!ledger.is_revoked("tok-edge").await);
        assert_eq!(cache.mode(), CacheMode::Networked);
    }
}
