//! TTL cache with per-key fetch coalescing.
//!
//! One instance per data kind, each with its own TTL. Staleness is
//! evaluated lazily on read; nothing sweeps entries in the background (the
//! daily rollover job clears whole caches instead). A stale entry is kept
//! until a fetch replaces it, so a total upstream outage degrades to
//! serving the last known value rather than an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
    // Per-key flight locks: concurrent misses on one key coalesce into a
    // single upstream fetch while distinct keys proceed in parallel.
    flights: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    fn any(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn store(&self, key: &str, value: V) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    fn flight(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut flights = self.flights.lock().unwrap();
        Arc::clone(flights.entry(key.to_string()).or_default())
    }

    /// Returns the fresh cached value, or runs `fetch` and caches the
    /// result. Concurrent callers for the same key share one fetch: the
    /// winner stores its result and every waiter picks it up from the
    /// cache without another upstream call. When the fetch fails, a stale
    /// entry (if any) is served instead of the error.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.fresh(key) {
            debug!(key, "cache hit");
            return Ok(value);
        }

        let flight = self.flight(key);
        let _leader = flight.lock().await;

        // A concurrent winner may have refreshed the entry while this
        // caller queued on the flight lock.
        if let Some(value) = self.fresh(key) {
            debug!(key, "cache hit after coalesced fetch");
            return Ok(value);
        }

        debug!(key, "cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                self.store(key, value.clone());
                Ok(value)
            }
            Err(err) => match self.any(key) {
                Some(stale) => {
                    warn!(key, error = %err, "fetch failed, serving stale entry");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Bypasses the freshness check: always fetches, overwrites on
    /// success, and leaves any prior entry untouched on failure.
    pub async fn force_refresh<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let flight = self.flight(key);
        let _leader = flight.lock().await;

        let value = fetch().await?;
        self.store(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.flights.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &AtomicUsize,
        result: Result<i32, String>,
    ) -> impl Future<Output = Result<i32, String>> {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { result }
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_fetch() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        let second = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(2)))
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refetches() {
        let cache = TtlCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        let second = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(2)))
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_entry() {
        let cache = TtlCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        let second = cache
            .get_or_fetch("k", || counting_fetch(&calls, Err("down".to_string())))
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_fetch("k", || counting_fetch(&calls, Err("down".to_string())))
            .await;

        assert_eq!(result, Err("down".to_string()));
    }

    #[tokio::test]
    async fn test_clear_forces_fresh_fetch() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let _ = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        cache.clear();
        let after = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(2)))
            .await;

        assert_eq!(after, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites_fresh_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let _ = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        let refreshed = cache
            .force_refresh("k", || counting_fetch(&calls, Ok(2)))
            .await;
        let read_back = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(3)))
            .await;

        assert_eq!(refreshed, Ok(2));
        assert_eq!(read_back, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_failure_keeps_prior_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let _ = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(1)))
            .await;
        let refreshed = cache
            .force_refresh("k", || counting_fetch(&calls, Err("down".to_string())))
            .await;
        let read_back = cache
            .get_or_fetch("k", || counting_fetch(&calls, Ok(3)))
            .await;

        assert_eq!(refreshed, Err("down".to_string()));
        assert_eq!(read_back, Ok(1));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_fetch = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<i32, String>(7)
        };

        let a = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get_or_fetch("k", || slow_fetch(calls)).await })
        };
        let b = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get_or_fetch("k", || slow_fetch(calls)).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let _ = cache
            .get_or_fetch("a", || counting_fetch(&calls, Ok(1)))
            .await;
        let _ = cache
            .get_or_fetch("b", || counting_fetch(&calls, Ok(2)))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
