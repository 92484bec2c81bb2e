//! Time-bounded dedup cache.
//!
//! The cache answers one question: has this signature been seen within the
//! last retention period? Entries are keyed by `Signature` and remember only
//! when they were inserted.
//!
//! Expiry happens in two places. Reads treat an expired entry as absent and
//! overwrite it, so correctness never depends on cleanup. Independently,
//! `observe` runs a full sweep at most once per retention period so
//! signatures that are never seen again do not accumulate.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage};
use crate::domain::{policy::RetentionPolicy, signature::Signature};
use crate::infrastructure::storage::ShardedStorage;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A remembered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    inserted_at: Instant,
}

impl CacheEntry {
    /// Create an entry recorded at `inserted_at`.
    pub fn new(inserted_at: Instant) -> Self {
        Self { inserted_at }
    }

    /// When the signature was recorded.
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }
}

/// Default backing store for the cache.
pub type CacheStorage = Arc<ShardedStorage<Signature, CacheEntry>>;

/// Signature cache with per-entry expiry.
///
/// Generic over the storage so tests can substitute their own; production
/// code uses `CacheStorage`.
#[derive(Debug)]
pub struct DedupCache<S = CacheStorage>
where
    S: Storage<Signature, CacheEntry> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
    metrics: Metrics,
    epoch: Instant,
    // Nanoseconds after `epoch` at which the last sweep ran.
    last_sweep: AtomicU64,
}

impl DedupCache<CacheStorage> {
    /// Create a cache over a fresh sharded map.
    pub fn with_default_storage(
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
        metrics: Metrics,
    ) -> Self {
        Self::new(Arc::new(ShardedStorage::new()), clock, retention, metrics)
    }
}

impl<S> DedupCache<S>
where
    S: Storage<Signature, CacheEntry> + Clone,
{
    /// Create a cache over `storage`.
    pub fn new(
        storage: S,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
        metrics: Metrics,
    ) -> Self {
        let epoch = clock.now();
        Self {
            storage,
            clock,
            retention,
            metrics,
            epoch,
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Record `signature` and report whether it is new.
    ///
    /// Returns `true` when the signature is absent or its entry has expired;
    /// the entry is (re)inserted with the current time. Returns `false` while
    /// an unexpired entry exists. Concurrent callers racing on an unseen
    /// signature get exactly one `true`.
    pub fn observe(&self, signature: Signature) -> bool {
        let now = self.clock.now();
        let fresh = Cell::new(false);
        let retention = self.retention;

        let is_new = self.storage.with_entry_mut(
            signature,
            || {
                fresh.set(true);
                CacheEntry::new(now)
            },
            |entry| {
                if fresh.get() {
                    return true;
                }
                if retention.is_expired(entry.inserted_at, now) {
                    *entry = CacheEntry::new(now);
                    return true;
                }
                false
            },
        );

        self.maybe_sweep(now);
        is_new
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention;
        let mut removed = 0;
        self.storage.retain(|_, entry| {
            let expired = retention.is_expired(entry.inserted_at, now);
            removed += usize::from(expired);
            !expired
        });
        if removed > 0 {
            self.metrics.record_expired(removed);
            tracing::trace!(removed, "purged expired signatures");
        }
        removed
    }

    /// The retention policy.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Forget every signature.
    pub fn clear(&self) {
        self.storage.clear();
    }

    fn maybe_sweep(&self, now: Instant) {
        let elapsed = saturating_nanos(now.saturating_duration_since(self.epoch));
        let interval = saturating_nanos(self.retention.period());
        let last = self.last_sweep.load(Ordering::Relaxed);

        if elapsed.saturating_sub(last) < interval {
            return;
        }
        // One caller wins the slot; the rest keep going without sweeping.
        if self
            .last_sweep
            .compare_exchange(last, elapsed, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired();
        }
    }
}

fn saturating_nanos(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::thread;
    use std::time::Duration;

    fn cache_with(period: Duration) -> (DedupCache, MockClock, Metrics) {
        let clock = MockClock::starting_now();
        let metrics = Metrics::new();
        let cache = DedupCache::with_default_storage(
            Arc::new(clock.clone()),
            RetentionPolicy::new(period).unwrap(),
            metrics.clone(),
        );
        (cache, clock, metrics)
    }

    /// Storage where another writer inserts while a sweep is running.
    #[derive(Debug, Clone)]
    struct RacingWriter(CacheStorage);

    impl Storage<Signature, CacheEntry> for RacingWriter {
        fn with_entry_mut<F, R>(
            &self,
            key: Signature,
            factory: impl FnOnce() -> CacheEntry,
            accessor: F,
        ) -> R
        where
            F: FnOnce(&mut CacheEntry) -> R,
        {
            self.0.with_entry_mut(key, factory, accessor)
        }

        fn len(&self) -> usize {
            self.0.len()
        }

        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        fn clear(&self) {
            self.0.clear()
        }

        fn retain<F>(&self, f: F)
        where
            F: FnMut(&Signature, &mut CacheEntry) -> bool,
        {
            self.0.retain(f);
            self.0.with_entry_mut(
                Signature::from_raw("late/"),
                || CacheEntry::new(Instant::now()),
                |_| (),
            );
        }
    }

    #[test]
    fn test_purge_counts_removals_despite_concurrent_inserts() {
        let clock = MockClock::starting_now();
        let metrics = Metrics::new();
        let cache = DedupCache::new(
            RacingWriter(Arc::new(ShardedStorage::new())),
            Arc::new(clock.clone()),
            RetentionPolicy::new(Duration::from_secs(10)).unwrap(),
            metrics.clone(),
        );

        assert!(cache.observe(Signature::from_raw("a/")));
        assert!(cache.observe(Signature::from_raw("b/")));
        clock.advance(Duration::from_secs(10));

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(metrics.signatures_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_first_observation_is_new() {
        let (cache, _clock, _) = cache_with(Duration::from_secs(10));

        assert!(cache.observe(Signature::from_raw("a/1/")));
        assert!(!cache.observe(Signature::from_raw("a/1/")));
        assert!(cache.observe(Signature::from_raw("b/1/")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_repeat_inside_window_is_suppressed() {
        let (cache, clock, _) = cache_with(Duration::from_millis(400));
        let sig = Signature::from_raw("k");

        assert!(cache.observe(sig.clone()));
        clock.advance(Duration::from_millis(399));
        assert!(!cache.observe(sig));
    }

    #[test]
    fn test_entry_expires_after_period() {
        let (cache, clock, _) = cache_with(Duration::from_millis(400));
        let sig = Signature::from_raw("k");

        assert!(cache.observe(sig.clone()));
        assert!(!cache.observe(sig.clone()));
        clock.advance(Duration::from_millis(400));
        assert!(cache.observe(sig.clone()));
        assert!(!cache.observe(sig));
    }

    #[test]
    fn test_repeats_do_not_extend_window() {
        let (cache, clock, _) = cache_with(Duration::from_secs(10));
        let sig = Signature::from_raw("k");

        assert!(cache.observe(sig.clone()));
        clock.advance(Duration::from_secs(6));
        assert!(!cache.observe(sig.clone()));
        clock.advance(Duration::from_secs(4));
        assert!(cache.observe(sig));
    }

    #[test]
    fn test_purge_expired_removes_only_expired() {
        let (cache, clock, metrics) = cache_with(Duration::from_secs(10));

        cache.observe(Signature::from_raw("old"));
        clock.advance(Duration::from_secs(5));
        cache.observe(Signature::from_raw("young"));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(metrics.signatures_expired(), 1);
        assert!(!cache.observe(Signature::from_raw("young")));
    }

    #[test]
    fn test_observe_sweeps_once_per_period() {
        let (cache, clock, metrics) = cache_with(Duration::from_secs(1));

        for i in 0..50 {
            cache.observe(Signature::from_raw(format!("sig-{}", i)));
        }
        assert_eq!(cache.len(), 50);

        clock.advance(Duration::from_secs(1));
        // The sweep runs after this entry is written, so only it survives.
        assert!(cache.observe(Signature::from_raw("trigger")));
        assert_eq!(cache.len(), 1);
        assert_eq!(metrics.signatures_expired(), 50);
    }

    #[test]
    fn test_clear() {
        let (cache, _clock, _) = cache_with(Duration::from_secs(10));
        cache.observe(Signature::from_raw("a"));
        cache.observe(Signature::from_raw("b"));

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.observe(Signature::from_raw("a")));
    }

    #[test]
    fn test_concurrent_first_observation_single_winner() {
        let (cache, _clock, _) = cache_with(Duration::from_secs(60));
        let cache = Arc::new(cache);
        let mut handles = vec![];

        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                (0..100)
                    .filter(|_| cache.observe(Signature::from_raw("shared")))
                    .count()
            }));
        }

        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, 1);
    }
}
