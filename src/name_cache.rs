// Plant name cache - time-bounded cache of the current best-known name per
// (network, plant id). Freshness is enforced on read; the periodic sweep only
// bounds memory for ids that are never asked for again.

use dashmap::DashMap;
use ethers::types::U256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics;

/// Default entry lifetime (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache slot identity: chain id plus plant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub network: u64,
    pub id: U256,
}

impl CacheKey {
    pub fn new(network: u64, id: U256) -> Self {
        Self { network, id }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    name: String,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) < ttl
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, PartialEq)]
pub struct NameCacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub swept: u64,
    pub cache_size: usize,
}

/// Time-expiring name cache shared by every in-flight resolution.
///
/// Writes replace the whole entry for a key (last write wins); readers never
/// observe a partially written entry. An entry is returned only while its age
/// is strictly below the TTL, regardless of when the sweep last ran.
pub struct NameCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    counters: CacheCounters,
}

impl NameCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached name if present and younger than the TTL.
    /// Expired entries are left in place for the sweep.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.name.clone());

        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            metrics::increment_cache_hit();
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            metrics::increment_cache_miss();
        }
        hit
    }

    /// Inserts or overwrites the entry for `key`, stamped with the current instant.
    pub fn put(&self, key: CacheKey, name: impl Into<String>) {
        self.entries.insert(
            key,
            CacheEntry {
                name: name.into(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Removes every entry whose age has reached the TTL and returns how many
    /// were dropped.
    ///
    /// Each entry is judged against its own timestamp while its shard is
    /// locked, so an entry refreshed by a concurrent `put` is kept.
    pub fn sweep(&self) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            if entry.is_fresh(Instant::now(), self.ttl) {
                true
            } else {
                removed += 1;
                false
            }
        });

        self.counters.swept.fetch_add(removed as u64, Ordering::Relaxed);
        metrics::record_cache_swept(removed as u64);
        metrics::set_cache_size(self.entries.len() as f64);
        removed
    }

    /// Starts the background sweep, ticking once per TTL.
    ///
    /// The task lives until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        self.spawn_sweeper_every(self.ttl)
    }

    /// Same as [`spawn_sweeper`](Self::spawn_sweeper) with an explicit period.
    pub fn spawn_sweeper_every(self: &Arc<Self>, period: Duration) -> SweeperHandle {
        let cache = Arc::clone(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            // First tick one full period after start; the cache is empty at construction.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            info!(
                                removed,
                                size = cache.len(),
                                "Cleaned {} expired entries from plant name cache",
                                removed
                            );
                        } else {
                            debug!(size = cache.len(), "plant name cache sweep found nothing to remove");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            debug!("plant name cache sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    pub fn metrics(&self) -> NameCacheMetrics {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        NameCacheMetrics {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            swept: self.counters.swept.load(Ordering::Relaxed),
            cache_size: self.entries.len(),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for NameCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Owns the background sweep task of a [`NameCache`].
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u64) -> CacheKey {
        CacheKey::new(8453, U256::from(id))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_respects_ttl_boundary() {
        let cache = NameCache::new(Duration::from_secs(300));
        cache.put(key(1), "Foo");

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key(1)).as_deref(), Some("Foo"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key(1)), None);
        // Reads do not evict.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_restamps() {
        let cache = NameCache::new(Duration::from_secs(10));
        cache.put(key(7), "Old");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(key(7), "New");
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&key(7)).as_deref(), Some("New"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_scoped_by_network() {
        let cache = NameCache::default();
        cache.put(CacheKey::new(8453, U256::from(5)), "Mainnet");
        assert_eq!(cache.get(&CacheKey::new(84532, U256::from(5))), None);
        assert_eq!(
            cache.get(&CacheKey::new(8453, U256::from(5))).as_deref(),
            Some("Mainnet")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = NameCache::new(Duration::from_secs(60));
        cache.put(key(1), "a");
        cache.put(key(2), "b");
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.put(key(3), "c");
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(3)).as_deref(), Some("c"));
        assert_eq!(cache.metrics().swept, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_entry_refreshed_after_expiry() {
        let cache = NameCache::new(Duration::from_secs(60));
        cache.put(key(1), "stale");
        cache.put(key(2), "gone");
        tokio::time::advance(Duration::from_secs(90)).await;

        // Key 1 expired, then was rewritten before the sweep ran.
        cache.put(key(1), "fresh");

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get(&key(1)).as_deref(), Some("fresh"));
        assert_eq!(cache.get(&key(2)), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_runs_and_stops() {
        let cache = Arc::new(NameCache::new(Duration::from_secs(60)));
        cache.put(key(1), "a");
        let handle = cache.spawn_sweeper();

        // Past the first tick at t=60s the entry has aged out and is purged.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().swept, 1);

        handle.shutdown().await;
        cache.put(key(2), "b");
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_track_hits_and_misses() {
        let cache = NameCache::default();
        cache.put(key(1), "a");
        cache.get(&key(1));
        cache.get(&key(2));
        cache.get(&key(1));

        let m = cache.metrics();
        assert_eq!(m.hits, 2);
        assert_eq!(m.misses, 1);
        assert!((m.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }
}
