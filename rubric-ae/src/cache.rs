//! Short-lived result cache
//!
//! Keyed values with a time-to-live and free-form tags. Expiry is lazy:
//! an entry is only discarded when a read finds it stale. Concurrent misses
//! on the same key each run their own compute; the last write wins. A
//! compute that overlaps any invalidation is returned to its caller but not
//! stored.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde::Serialize;
use tracing::debug;

use rubric_common::time::{Clock, SystemClock};

struct CacheEntry<V> {
    value: V,
    written_at: Duration,
    ttl: Duration,
    tags: HashSet<String>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Duration) -> bool {
        now.saturating_sub(self.written_at) < self.ttl
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct Inner<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Bumped under the entries lock by every invalidation
    epoch: AtomicU64,
}

/// TTL + tag cache; clones share storage
pub struct ResultCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ResultCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> ResultCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                clock,
                default_ttl,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value for `key`, computing and storing it on a miss
    ///
    /// `ttl = None` uses the cache default. The compute future runs without
    /// the cache lock held. A failed compute is returned as-is and nothing is
    /// stored, as is a value whose compute overlapped an invalidation.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        tags: &[String],
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let value = compute().await?;

        let entry = self.entry(value.clone(), ttl, tags);
        let mut entries = self.lock();
        if self.inner.epoch.load(Ordering::SeqCst) == epoch {
            entries.insert(key.to_string(), entry);
        } else {
            debug!(key, "Discarding value computed across an invalidation");
        }
        Ok(value)
    }

    /// Fresh value for `key`, dropping it if stale
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.inner.clock.elapsed();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache entry expired");
                None
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value`, replacing any previous entry for `key`
    pub fn insert(&self, key: &str, value: V, ttl: Option<Duration>, tags: &[String]) {
        let entry = self.entry(value, ttl, tags);
        self.lock().insert(key.to_string(), entry);
    }

    fn entry(&self, value: V, ttl: Option<Duration>, tags: &[String]) -> CacheEntry<V> {
        CacheEntry {
            value,
            written_at: self.inner.clock.elapsed(),
            ttl: ttl.unwrap_or(self.inner.default_ttl),
            tags: tags.iter().cloned().collect(),
        }
    }

    /// Lock the entries and advance the invalidation epoch
    fn lock_for_invalidation(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        let entries = self.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        entries
    }

    /// Remove one key; returns whether it was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock_for_invalidation().remove(key).is_some()
    }

    /// Remove every entry carrying `tag`
    ///
    /// # Returns
    /// Number of entries removed
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut entries = self.lock_for_invalidation();
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.contains(tag));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(tag, removed, "Invalidated cache entries by tag");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock_for_invalidation().clear();
    }

    /// Stored entries, including stale ones not yet read
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubric_common::time::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl_secs: u64) -> (ResultCache<u32>, ManualClock) {
        let clock = ManualClock::new();
        let cache = ResultCache::with_clock(Duration::from_secs(ttl_secs), Arc::new(clock.clone()));
        (cache, clock)
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn counted(cache: &ResultCache<u32>, key: &str, calls: &AtomicUsize, value: u32) -> u32 {
        cache
            .get_or_compute(key, None, &tags(&["assignment:1"]), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(value)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_compute_runs_once_within_ttl() {
        let (cache, clock) = cache(60);
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, "stats:1", &calls, 7).await, 7);
        clock.advance(Duration::from_secs(59));
        assert_eq!(counted(&cache, "stats:1", &calls, 8).await, 7);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_expired_entry_recomputed() {
        let (cache, clock) = cache(60);
        let calls = AtomicUsize::new(0);

        counted(&cache, "stats:1", &calls, 7).await;
        clock.advance(Duration::from_secs(60));
        assert_eq!(counted(&cache, "stats:1", &calls, 9).await, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_call_ttl_overrides_default() {
        let (cache, clock) = cache(600);
        cache.insert("short", 1, Some(Duration::from_secs(5)), &[]);

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.get("short"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_tag_invalidation_removes_only_tagged_entries() {
        let (cache, _clock) = cache(60);
        cache.insert("a", 1, None, &tags(&["assignment:1", "student:k"]));
        cache.insert("b", 2, None, &tags(&["assignment:1"]));
        cache.insert("c", 3, None, &tags(&["assignment:2"]));

        assert_eq!(cache.invalidate_by_tag("assignment:1"), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(3));

        let calls = AtomicUsize::new(0);
        assert_eq!(counted(&cache, "a", &calls, 10).await, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_compute_not_cached() {
        let (cache, _clock) = cache(60);

        let err = cache
            .get_or_compute("k", None, &[], || async { Err::<u32, _>("db down") })
            .await
            .unwrap_err();
        assert_eq!(err, "db down");
        assert!(cache.is_empty());

        let calls = AtomicUsize::new(0);
        assert_eq!(counted(&cache, "k", &calls, 4).await, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (cache, _clock) = cache(60);
        cache.insert("a", 1, None, &[]);
        cache.insert("b", 2, None, &[]);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_compute_overlapping_invalidation_is_not_stored() {
        let (cache, _clock) = cache(60);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Given: A compute that read the old state and is still running
        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("stats:1", None, &tags(&["assignment:1"]), || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<_, String>(0)
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        // When: A write invalidates the tag before that compute finishes
        cache.invalidate_by_tag("assignment:1");
        release_tx.send(()).unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), 0);

        // Then: The next read computes the new value
        assert!(cache.is_empty());
        let calls = AtomicUsize::new(0);
        assert_eq!(counted(&cache, "stats:1", &calls, 1).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
