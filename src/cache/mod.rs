//! TTL caches for provider data, with single-flight population.
//!
//! Three spaces back the booking flow: the route map and station list (one
//! entry each, long TTL) and search results (keyed by search id, short TTL,
//! LRU-bounded). Each space carries its own population lock so a cold
//! stations read never blocks a search-result read. Fast-path hits take no
//! lock at all.
//!
//! Population runs as a detached task: a caller whose request is cancelled
//! mid-populate does not abort the fetch, and its result still lands in the
//! cache for the waiters queued on the space lock.

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::provider::models::{RouteMap, SearchResult, Station};

/// A cached value with its write time and last-access stamp.
struct Entry<V> {
    value: Arc<V>,
    written: Instant,
    /// Milliseconds since the cache epoch, bumped on every hit. Drives LRU
    /// eviction without taking a write lock on reads.
    accessed: AtomicU64,
}

struct Inner<K, V> {
    space: &'static str,
    ttl: Duration,
    /// LRU bound; `None` for the singleton spaces.
    capacity: Option<usize>,
    epoch: Instant,
    entries: DashMap<K, Entry<V>>,
    /// Per-space single-flight lock, held only for the duration of a
    /// population fetch.
    populate: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn store(&self, key: K, value: Arc<V>) {
        self.entries.insert(
            key,
            Entry {
                value,
                written: Instant::now(),
                accessed: AtomicU64::new(self.now_ms()),
            },
        );
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                // Linear scan over at most `capacity` entries.
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.value().accessed.load(Ordering::Relaxed))
                    .map(|entry| entry.key().clone());
                match oldest {
                    Some(key) => {
                        self.entries.remove(&key);
                        debug!(space = self.space, "evicted least-recently-used entry");
                    }
                    None => break,
                }
            }
        }
    }
}

/// One logical cache space: TTL'd entries plus a per-space population lock.
///
/// Clone-cheap (all internals behind one `Arc`).
pub struct TtlCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(space: &'static str, ttl: Duration, capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                space,
                ttl,
                capacity,
                epoch: Instant::now(),
                entries: DashMap::new(),
                populate: Mutex::new(()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Plain read: the cached value if present and unexpired, else `None`.
    /// Never triggers population -- an absent search session must surface as
    /// expired, not silently re-fetch.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.read(key, true)
    }

    fn read(&self, key: &K, record: bool) -> Option<Arc<V>> {
        let mut expired = false;
        let value = match self.inner.entries.get(key) {
            Some(entry) => {
                if entry.written.elapsed() < self.inner.ttl {
                    entry
                        .accessed
                        .store(self.inner.now_ms(), Ordering::Relaxed);
                    Some(Arc::clone(&entry.value))
                } else {
                    expired = true;
                    None
                }
            }
            None => None,
        };
        if expired {
            // The read guard above is dropped; re-check under the removal so
            // a concurrent repopulation is not thrown away.
            self.inner
                .entries
                .remove_if(key, |_, entry| entry.written.elapsed() >= self.inner.ttl);
        }
        if record {
            let counter = if value.is_some() {
                &self.inner.hits
            } else {
                &self.inner.misses
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Unconditionally store a value, evicting the least-recently-used entry
    /// if the space is over its bound. Returns the stored handle.
    pub fn put(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.inner.store(key, Arc::clone(&value));
        value
    }

    /// Cached read with single-flight population.
    ///
    /// Fast path: an unexpired entry is returned without touching the space
    /// lock. On a miss the caller takes the per-space lock, re-checks under
    /// it, and only if still absent runs `fetcher` -- exactly once per cold
    /// key per population race. Queued callers observe the fresh value on
    /// their own double-check and never fetch.
    ///
    /// Fetcher errors propagate unchanged to the invoking caller; nothing is
    /// cached, so a later call may retry population.
    pub async fn get_or_populate<E, F, Fut>(&self, key: K, fetcher: F) -> Result<Arc<V>, E>
    where
        E: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.read(&key, true) {
            return Ok(value);
        }

        let _guard = self.inner.populate.lock().await;
        if let Some(value) = self.read(&key, false) {
            return Ok(value);
        }

        debug!(space = self.inner.space, "cold key, populating");
        let fut = fetcher();
        let inner = Arc::clone(&self.inner);
        // Detached so the fetch outlives a cancelled trigger caller; the
        // write-through happens inside the task for the same reason.
        let handle = tokio::spawn(async move {
            fut.await.map(|value| {
                let value = Arc::new(value);
                inner.store(key, Arc::clone(&value));
                value
            })
        });
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => unreachable!("population task is never aborted"),
        }
    }

    /// Drop every entry. Test isolation only -- not part of request flow.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Monitoring snapshot; never affects behavior. Size counts entries not
    /// yet physically evicted, so it may include expired ones.
    pub fn stats(&self) -> SpaceStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        SpaceStats {
            space: self.inner.space,
            size: self.inner.entries.len(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStats {
    pub space: &'static str,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// TTLs and bounds for the three spaces, all overridable via environment.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub route_map_ttl: Duration,
    pub stations_ttl: Duration,
    pub search_ttl: Duration,
    pub search_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            // Route network and stations change rarely; one fetch a day.
            route_map_ttl: Duration::from_secs(24 * 60 * 60),
            stations_ttl: Duration::from_secs(24 * 60 * 60),
            // Long enough for a slow user to finish booking what they saw.
            search_ttl: Duration::from_secs(5 * 60),
            search_capacity: 1000,
        }
    }
}

/// The three cache spaces shared across all requests.
#[derive(Clone)]
pub struct FlightCache {
    pub route_map: TtlCache<(), RouteMap>,
    pub stations: TtlCache<(), Vec<Station>>,
    pub searches: TtlCache<String, SearchResult>,
}

impl FlightCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            route_map: TtlCache::new("route_map", settings.route_map_ttl, None),
            stations: TtlCache::new("stations", settings.stations_ttl, None),
            searches: TtlCache::new(
                "searches",
                settings.search_ttl,
                Some(settings.search_capacity),
            ),
        }
    }

    /// Clear every space. Test isolation only.
    pub fn invalidate_all(&self) {
        self.route_map.clear();
        self.stations.clear();
        self.searches.clear();
    }

    pub fn stats(&self) -> Vec<SpaceStats> {
        vec![
            self.route_map.stats(),
            self.stations.stats(),
            self.searches.stats(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl: Duration, capacity: Option<usize>) -> TtlCache<String, u64> {
        TtlCache::new("test", ttl, capacity)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let cache = cache(Duration::from_secs(60), None);
        cache.put("k".to_owned(), 7);
        assert_eq!(cache.get(&"k".to_owned()).as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn zero_ttl_entry_is_absent() {
        let cache = cache(Duration::ZERO, None);
        cache.put("k".to_owned(), 7);
        assert!(cache.get(&"k".to_owned()).is_none());
        // Lazy eviction removed it physically too.
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cold_start_race_fetches_exactly_once() {
        let cache = cache(Duration::from_secs(60), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate("k".to_owned(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, Infallible>(42)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // All callers converge on the single populated value.
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert_eq!(*values[0], 42);
    }

    #[tokio::test]
    async fn expired_key_triggers_single_repopulation() {
        let cache = cache(Duration::ZERO, None);
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2usize {
            let calls_inner = Arc::clone(&calls);
            let value = cache
                .get_or_populate("k".to_owned(), move || async move {
                    Ok::<_, Infallible>(calls_inner.fetch_add(1, Ordering::SeqCst) as u64)
                })
                .await
                .unwrap();
            assert_eq!(*value, expected as u64 - 1);
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cache_empty_and_retryable() {
        let cache = cache(Duration::from_secs(60), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_first = Arc::clone(&calls);
        let first: Result<Arc<u64>, &str> = cache
            .get_or_populate("k".to_owned(), move || async move {
                calls_first.fetch_add(1, Ordering::SeqCst);
                Err("upstream down")
            })
            .await;
        assert_eq!(first.unwrap_err(), "upstream down");
        assert!(cache.get(&"k".to_owned()).is_none());

        // A later call may retry population and succeed.
        let calls_second = Arc::clone(&calls);
        let second = cache
            .get_or_populate("k".to_owned(), move || async move {
                calls_second.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(9)
            })
            .await
            .unwrap();
        assert_eq!(*second, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn population_survives_caller_cancellation() {
        let cache = cache(Duration::from_secs(60), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let task_cache = cache.clone();
        let task_calls = Arc::clone(&calls);
        let task = tokio::spawn(async move {
            task_cache
                .get_or_populate("k".to_owned(), move || async move {
                    task_calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, Infallible>(42)
                })
                .await
        });

        // Cancel the trigger caller while the fetch is in flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        // The detached population still completes and writes through.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&"k".to_owned()).as_deref(), Some(&42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spaces_do_not_block_each_other() {
        let slow = cache(Duration::from_secs(60), None);
        let fast = cache(Duration::from_secs(60), None);
        fast.put("k".to_owned(), 1);

        let slow_clone = slow.clone();
        let populate = tokio::spawn(async move {
            slow_clone
                .get_or_populate("cold".to_owned(), || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, Infallible>(0)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        // A read on another space returns while the first is mid-populate.
        let start = Instant::now();
        assert!(fast.get(&"k".to_owned()).is_some());
        assert!(start.elapsed() < Duration::from_millis(50));

        populate.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn capacity_bound_evicts_least_recently_used() {
        let cache = cache(Duration::from_secs(60), Some(2));
        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);

        // Touch "a" so "b" becomes the eviction victim.
        assert!(cache.get(&"a".to_owned()).is_some());
        cache.put("c".to_owned(), 3);

        assert!(cache.get(&"a".to_owned()).is_some());
        assert!(cache.get(&"b".to_owned()).is_none());
        assert!(cache.get(&"c".to_owned()).is_some());
        assert_eq!(cache.stats().size, 2);
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = cache(Duration::from_secs(60), None);
        cache.put("k".to_owned(), 1);
        cache.get(&"k".to_owned());
        cache.get(&"k".to_owned());
        cache.get(&"missing".to_owned());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_space() {
        let flight_cache = FlightCache::new(&CacheSettings::default());
        flight_cache.route_map.put((), RouteMap::default());
        flight_cache.searches.put(
            "S1".to_owned(),
            SearchResult {
                search_id: "S1".into(),
                flights: Vec::new(),
            },
        );

        flight_cache.invalidate_all();
        assert!(flight_cache.route_map.get(&()).is_none());
        assert!(flight_cache.searches.get(&"S1".to_owned()).is_none());
    }
}
