use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Operations the networked cache tier must provide. Kept narrow so a
/// failing stand-in can drive the degradation path in tests.
#[async_trait]
pub(crate) trait NetworkedBackend: Send + Sync {
    async fn set_ex(&self, key: String, value: String, ttl_secs: u64) -> redis::RedisResult<()>;

    async fn get(&self, key: String) -> redis::RedisResult<Option<String>>;

    async fn del(&self, key: String) -> redis::RedisResult<()>;

    /// Keys matching `pattern` paired with their values, skipping keys
    /// that vanish between the scan and the read.
    async fn scan_values(&self, pattern: String) -> redis::RedisResult<Vec<(String, String)>>;

    async fn ping(&self) -> redis::RedisResult<()>;
}

pub(crate) struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub(crate) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NetworkedBackend for RedisBackend {
    async fn set_ex(&self, key: String, value: String, ttl_secs: u64) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
    }

    async fn get(&self, key: String) -> redis::RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await
    }

    async fn del(&self, key: String) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await
    }

    async fn scan_values(&self, pattern: String) -> redis::RedisResult<Vec<(String, String)>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = conn.mget(&keys).await?;
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .collect())
    }

    async fn ping(&self) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::NetworkedBackend;

    /// In-process stand-in for the networked tier. While `failing` is set,
    /// every call errors the way a dropped connection would.
    pub(crate) struct FlakyBackend {
        entries: Mutex<HashMap<String, String>>,
        failing: AtomicBool,
    }

    impl FlakyBackend {
        pub(crate) fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                failing: AtomicBool::new(false),
            }
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub(crate) fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }

        fn check(&self) -> redis::RedisResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection lost").into())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NetworkedBackend for FlakyBackend {
        async fn set_ex(
            &self,
            key: String,
            value: String,
            _ttl_secs: u64,
        ) -> redis::RedisResult<()> {
            self.check()?;
            self.entries.lock().unwrap().insert(key, value);
            Ok(())
        }

        async fn get(&self, key: String) -> redis::RedisResult<Option<String>> {
            self.check()?;
            Ok(self.entries.lock().unwrap().get(&key).cloned())
        }

        async fn del(&self, key: String) -> redis::RedisResult<()> {
            self.check()?;
            self.entries.lock().unwrap().remove(&key);
            Ok(())
        }

        async fn scan_values(&self, pattern: String) -> redis::RedisResult<Vec<(String, String)>> {
            self.check()?;
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect())
        }

        async fn ping(&self) -> redis::RedisResult<()> {
            self.check()
        }
    }
}
