//! Short-lived memoization of API reads
//!
//! Reads are cached per key for a fixed TTL, and concurrent reads of the same
//! key share one request. Mutations invalidate the keys they affect.

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use async_singleflight::Group;
use papaya::HashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// How long a successful read stays cached (10 seconds)
pub const REQUEST_CACHE_TTL_MS: i64 = 10_000;

#[derive(Debug, Clone)]
struct CachedEntry {
    expires_at_ms: i64,
    data: Value,
}

/// Per-panel request cache
pub struct RequestCache {
    entries: HashMap<String, CachedEntry>,
    in_flight: Group<Value, String>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl RequestCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, REQUEST_CACHE_TTL_MS)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl_ms: i64) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: Group::new(),
            clock,
            ttl_ms,
        }
    }

    /// Return the cached value for `key`, or run `request` to produce it
    ///
    /// With `force` the cache and any in-flight request are bypassed. Failed
    /// requests are never cached.
    pub async fn memoized<T, F, Fut>(&self, key: &str, force: bool, request: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if force {
            let data = request().await?;
            self.insert(key, serde_json::to_value(&data)?);
            return Ok(data);
        }

        if let Some(data) = self.fresh(key) {
            debug!(key = %key, "Request cache hit");
            return Ok(serde_json::from_value(data)?);
        }

        let (value, error, _shared) = self
            .in_flight
            .work(key, async {
                let data = request().await.map_err(|e| e.to_string())?;
                let value = serde_json::to_value(&data).map_err(|e| e.to_string())?;
                self.insert(key, value.clone());
                Ok(value)
            })
            .await;

        match (value, error) {
            (Some(value), None) => Ok(serde_json::from_value(value)?),
            (_, Some(err)) => Err(SessionError::Shared(err)),
            _ => Err(SessionError::Shared(
                "Unknown error during shared request".to_string(),
            )),
        }
    }

    /// Drop the cached value for `key`
    pub fn invalidate(&self, key: &str) {
        self.entries.pin().remove(key);
    }

    pub fn clear(&self) {
        self.entries.pin().clear();
    }

    fn fresh(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        self.entries
            .pin()
            .get(key)
            .filter(|entry| entry.expires_at_ms > now)
            .map(|entry| entry.data.clone())
    }

    fn insert(&self, key: &str, data: Value) {
        let entry = CachedEntry {
            expires_at_ms: self.clock.now_ms() + self.ttl_ms,
            data,
        };
        self.entries.pin().insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache() -> (RequestCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (RequestCache::new(clock.clone()), clock)
    }

    async fn list_users(calls: &AtomicUsize) -> Result<Vec<String>> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(vec![format!("user-{n}")])
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        let first: Vec<String> = cache
            .memoized("admin-users:list", false, || list_users(&calls))
            .await
            .unwrap();
        clock.advance(9_999);
        let second: Vec<String> = cache
            .memoized("admin-users:list", false, || list_users(&calls))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        let third: Vec<String> = cache
            .memoized("admin-users:list", false, || list_users(&calls))
            .await
            .unwrap();
        assert_eq!(third, vec!["user-1".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_request() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        let (a, b) = tokio::join!(
            cache.memoized::<Vec<String>, _, _>("admin-prompts:list", false, || list_users(&calls)),
            cache.memoized::<Vec<String>, _, _>("admin-prompts:list", false, || list_users(&calls))
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        let _: Vec<String> = cache
            .memoized("k", false, || list_users(&calls))
            .await
            .unwrap();
        let forced: Vec<String> = cache
            .memoized("k", true, || list_users(&calls))
            .await
            .unwrap();

        assert_eq!(forced, vec!["user-1".to_string()]);
        let cached: Vec<String> = cache
            .memoized("k", false, || list_users(&calls))
            .await
            .unwrap();
        assert_eq!(cached, forced);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_failures() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        let failed: Result<Vec<String>> = cache
            .memoized("k", false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SessionError::Status {
                    status: 500,
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(matches!(failed, Err(SessionError::Shared(ref msg)) if msg.contains("boom")));

        let _: Vec<String> = cache
            .memoized("k", false, || list_users(&calls))
            .await
            .unwrap();
        cache.invalidate("k");
        let _: Vec<String> = cache
            .memoized("k", false, || list_users(&calls))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
