// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tick::Clock;

use crate::stats::Counters;
use crate::{LocalStats, LocalStoreBuilder, Ttl};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

#[derive(Debug)]
pub(crate) struct StoreInner<V> {
    map: DashMap<String, CacheEntry<V>>,
    // Occupied slots. Reserved before a vacant entry is filled so the bound holds under races.
    len: AtomicUsize,
    max_entries: usize,
    default_ttl: Option<Duration>,
    clock: Clock,
    name: Cow<'static, str>,
    counters: Counters,
}

/// A bounded, thread-safe, TTL-aware in-process map.
///
/// Clones are cheap and share the same entries. See the [crate documentation](crate) for the
/// capacity and expiry rules.
#[derive(Debug)]
pub struct LocalStore<V = Bytes> {
    pub(crate) inner: Arc<StoreInner<V>>,
}

impl<V> Clone for LocalStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> LocalStore<V> {
    /// Starts building a store that reads time from `clock`.
    #[must_use]
    pub fn builder(clock: Clock) -> LocalStoreBuilder<V> {
        LocalStoreBuilder::new(clock)
    }

    /// Creates a store holding at most `max_entries` keys, with no default TTL.
    #[must_use]
    pub fn new(clock: Clock, max_entries: usize) -> Self {
        Self::builder(clock).max_entries(max_entries).build()
    }

    pub(crate) fn from_builder(builder: LocalStoreBuilder<V>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                map: DashMap::new(),
                len: AtomicUsize::new(0),
                max_entries: builder.max_entries,
                default_ttl: builder.default_ttl,
                clock: builder.clock,
                name: builder.name,
                counters: Counters::default(),
            }),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    /// Returns the configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the clock the store measures deadlines with.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Returns `false` without modifying anything when `key` is new and the store is full.
    /// Expired entries are swept once before giving up. Replacing an existing key always
    /// succeeds.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: impl Into<Ttl>) -> bool {
        let expires_at = self.deadline(ttl.into());

        let (key, value) = match self.inner.try_insert(key.into(), value, expires_at) {
            Ok(()) => return true,
            Err(rejected) => rejected,
        };

        let key = if self.inner.sweep() > 0 {
            match self.inner.try_insert(key, value, expires_at) {
                Ok(()) => return true,
                Err((key, _)) => key,
            }
        } else {
            key
        };

        tracing::warn!(
            cache.name = %self.inner.name,
            cache.key = %key,
            cache.capacity = self.inner.max_entries,
            "local store is full, rejecting new entry"
        );
        false
    }

    /// Returns `true` if a live entry exists for `key`. Removes the entry if it has expired.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.inner.clock.instant();

        let expired = match self.inner.map.get(key) {
            Some(entry) if entry.is_live(now) => return true,
            Some(_) => true,
            None => false,
        };

        if expired {
            self.inner.remove_if_expired(key, now);
        }
        false
    }

    /// Removes `key`, returning `true` if it held a live value.
    pub fn remove(&self, key: &str) -> bool {
        let now = self.inner.clock.instant();
        let removed = self.inner.remove(key).is_some_and(|entry| entry.is_live(now));

        if removed {
            self.inner.counters.deleted(1);
        }
        removed
    }

    /// Removes several keys, returning how many held live values.
    pub fn remove_many<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        keys.iter().map(|key| u64::from(self.remove(key.as_ref()))).sum()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let removed = self.inner.retain(|_| false);
        tracing::debug!(cache.name = %self.inner.name, removed, "local store cleared");
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn sweep(&self) -> u64 {
        self.inner.sweep()
    }

    /// Returns the number of live entries. Sweeps expired entries first.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sweep();
        self.inner.len.load(Ordering::Acquire)
    }

    /// Returns `true` if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the live keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = self.inner.clock.instant();
        self.inner
            .map
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns a snapshot of the store counters.
    #[must_use]
    pub fn stats(&self) -> LocalStats {
        self.inner.counters.snapshot(self.inner.len.load(Ordering::Acquire) as u64)
    }

    /// Resets hit, miss, put and delete counters to zero.
    pub fn reset_stats(&self) {
        self.inner.counters.reset();
    }

    fn deadline(&self, ttl: Ttl) -> Option<Instant> {
        ttl.resolve(self.inner.default_ttl)
            .and_then(|ttl| self.inner.clock.instant().checked_add(ttl))
    }
}

impl<V: Clone> LocalStore<V> {
    /// Returns the value stored under `key`, or `None` if it is absent or expired.
    ///
    /// An expired entry is removed on the spot, whether or not the sweep has run.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.inner.clock.instant();

        let expired = match self.inner.map.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.inner.counters.hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.inner.remove_if_expired(key, now);
        }
        self.inner.counters.miss();
        None
    }
}

impl LocalStore<Bytes> {
    /// Adds `delta` to the decimal integer stored under `key` and returns the new value.
    ///
    /// A missing or expired key counts as zero and is stored without expiry; an existing key
    /// keeps its deadline. Returns `None` when the stored value is not an integer, the result
    /// would overflow, or the key is new and the store is full.
    pub fn increment(&self, key: &str, delta: i64) -> Option<i64> {
        let now = self.inner.clock.instant();

        let next = match self.inner.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let next = parse_integer(&occupied.get().value)?.checked_add(delta)?;
                occupied.get_mut().value = Bytes::from(next.to_string());
                next
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry {
                    value: Bytes::from(delta.to_string()),
                    expires_at: None,
                });
                delta
            }
            Entry::Vacant(vacant) => {
                if !self.inner.reserve_slot() {
                    tracing::warn!(
                        cache.name = %self.inner.name,
                        cache.key = %key,
                        "local store is full, rejecting new counter"
                    );
                    return None;
                }

                vacant.insert(CacheEntry {
                    value: Bytes::from(delta.to_string()),
                    expires_at: None,
                });
                delta
            }
        };

        self.inner.counters.put();
        Some(next)
    }
}

fn parse_integer(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}

impl<V> StoreInner<V> {
    fn reserve_slot(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| (len < self.max_entries).then_some(len + 1))
            .is_ok()
    }

    fn release_slots(&self, count: usize) {
        if count > 0 {
            self.len.fetch_sub(count, Ordering::AcqRel);
        }
    }

    /// Inserts or replaces an entry, handing the key and value back if the store is full.
    fn try_insert(&self, key: String, value: V, expires_at: Option<Instant>) -> Result<(), (String, V)> {
        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry { value, expires_at });
            }
            Entry::Vacant(vacant) => {
                if !self.reserve_slot() {
                    return Err((vacant.into_key(), value));
                }
                vacant.insert(CacheEntry { value, expires_at });
            }
        }

        self.counters.put();
        Ok(())
    }

    fn remove(&self, key: &str) -> Option<CacheEntry<V>> {
        let (_, entry) = self.map.remove(key)?;
        self.release_slots(1);
        Some(entry)
    }

    fn remove_if_expired(&self, key: &str, now: Instant) {
        if self.map.remove_if(key, |_, entry| !entry.is_live(now)).is_some() {
            self.release_slots(1);
        }
    }

    /// Keeps the entries for which `keep` returns `true` and returns how many were dropped.
    fn retain(&self, mut keep: impl FnMut(&CacheEntry<V>) -> bool) -> u64 {
        let mut removed = 0_usize;
        self.map.retain(|_, entry| {
            let kept = keep(entry);
            if !kept {
                removed += 1;
            }
            kept
        });

        self.release_slots(removed);
        removed as u64
    }

    pub(crate) fn sweep(&self) -> u64 {
        let now = self.clock.instant();
        let removed = self.retain(|entry| entry.is_live(now));

        if removed > 0 {
            tracing::debug!(cache.name = %self.name, removed, "swept expired entries");
        }
        removed
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tick::ClockControl;

    use super::*;

    fn store(control: &ClockControl, max_entries: usize) -> LocalStore<Bytes> {
        LocalStore::builder(control.to_clock()).max_entries(max_entries).build()
    }

    #[test]
    fn new_sets_capacity_without_default_ttl() {
        let store = LocalStore::<Bytes>::new(ClockControl::new().to_clock(), 5);

        assert_eq!(store.max_entries(), 5);
        assert!(store.put("a", Bytes::from_static(b"1"), Ttl::Default));
        assert!(store.inner.map.get("a").is_some_and(|entry| entry.expires_at.is_none()));
    }

    #[test]
    fn get_returns_stored_value_and_counts_hits() {
        let store = store(&ClockControl::new(), 10);

        assert!(store.put("k", Bytes::from_static(b"v"), Ttl::Never));
        assert_eq!(store.get("k"), Some(Bytes::from_static(b"v")));
        assert_eq!(store.get("missing"), None);

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses, stats.puts, stats.entries), (1, 1, 1, 1));
    }

    #[test]
    fn expired_entries_are_removed_lazily() {
        let control = ClockControl::new();
        let store = store(&control, 10);

        store.put("k", Bytes::from_static(b"v"), Ttl::from_minutes_f64(0.01));
        assert!(store.contains_key("k"));

        control.advance(Duration::from_secs(1));

        assert!(!store.contains_key("k"));
        assert_eq!(store.get("k"), None);
        assert_eq!(store.stats().entries, 0, "the expired slot is released without a sweep");
    }

    #[test]
    fn default_ttl_applies_only_to_default() {
        let control = ClockControl::new();
        let store = LocalStore::builder(control.to_clock())
            .default_ttl(Duration::from_secs(60))
            .build();

        store.put("default", Bytes::from_static(b"1"), Ttl::Default);
        store.put("never", Bytes::from_static(b"2"), Ttl::Never);
        control.advance(Duration::from_secs(61));

        assert_eq!(store.get("default"), None);
        assert_eq!(store.get("never"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn full_store_rejects_new_keys_without_evicting() {
        let store = store(&ClockControl::new(), 2);

        assert!(store.put("a", Bytes::from_static(b"1"), Ttl::Never));
        assert!(store.put("b", Bytes::from_static(b"2"), Ttl::Never));
        assert!(!store.put("c", Bytes::from_static(b"3"), Ttl::Never));

        assert_eq!(store.get("a"), Some(Bytes::from_static(b"1")));
        assert_eq!(store.get("b"), Some(Bytes::from_static(b"2")));
        assert_eq!(store.get("c"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn full_store_still_accepts_overwrites() {
        let store = store(&ClockControl::new(), 1);

        assert!(store.put("a", Bytes::from_static(b"1"), Ttl::Never));
        assert!(store.put("a", Bytes::from_static(b"2"), Ttl::Never));
        assert_eq!(store.get("a"), Some(Bytes::from_static(b"2")));
    }

    #[test]
    fn full_store_reclaims_expired_slots_before_rejecting() {
        let control = ClockControl::new();
        let store = store(&control, 1);

        store.put("old", Bytes::from_static(b"1"), Ttl::minutes(1));
        control.advance(Duration::from_secs(120));

        assert!(store.put("new", Bytes::from_static(b"2"), Ttl::Never));
        assert_eq!(store.keys(), vec!["new".to_string()]);
    }

    #[test]
    fn remove_reports_only_live_entries() {
        let control = ClockControl::new();
        let store = store(&control, 10);

        store.put("live", Bytes::from_static(b"1"), Ttl::Never);
        store.put("stale", Bytes::from_static(b"2"), Ttl::minutes(1));
        control.advance(Duration::from_secs(61));

        assert!(store.remove("live"));
        assert!(!store.remove("live"));
        assert!(!store.remove("stale"));
        assert_eq!(store.stats().deletes, 1);
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn remove_many_counts_removed_keys() {
        let store = store(&ClockControl::new(), 10);
        store.put("a", Bytes::from_static(b"1"), Ttl::Never);
        store.put("b", Bytes::from_static(b"2"), Ttl::Never);

        assert_eq!(store.remove_many(&["a", "b", "c"]), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = store(&ClockControl::new(), 10);

        store.clear();
        assert_eq!(store.len(), 0);

        store.put("a", Bytes::from_static(b"1"), Ttl::Never);
        store.clear();
        store.clear();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn len_sweeps_expired_entries() {
        let control = ClockControl::new();
        let store = store(&control, 10);

        store.put("a", Bytes::from_static(b"1"), Ttl::minutes(1));
        store.put("b", Bytes::from_static(b"2"), Ttl::Never);
        control.advance(Duration::from_secs(61));

        assert_eq!(store.stats().entries, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().entries, 1);
    }

    #[test]
    fn increment_counts_from_zero_and_keeps_deadline() {
        let control = ClockControl::new();
        let store = store(&control, 10);

        assert_eq!(store.increment("n", 5), Some(5));
        assert_eq!(store.increment("n", -2), Some(3));

        store.put("limited", Bytes::from_static(b"10"), Ttl::minutes(1));
        assert_eq!(store.increment("limited", 1), Some(11));
        control.advance(Duration::from_secs(61));
        assert_eq!(store.get("limited"), None);
    }

    #[test]
    fn increment_rejects_non_integers_and_full_store() {
        let store = store(&ClockControl::new(), 1);
        store.put("text", Bytes::from_static(b"abc"), Ttl::Never);

        assert_eq!(store.increment("text", 1), None);
        assert_eq!(store.increment("other", 1), None);
    }

    #[test]
    fn concurrent_puts_never_exceed_capacity() {
        let store = store(&ClockControl::new(), 50);

        let accepted: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let store = store.clone();
                    scope.spawn(move || {
                        (0..20)
                            .filter(|i| store.put(format!("{worker}-{i}"), Bytes::new(), Ttl::Never))
                            .count()
                    })
                })
                .collect();

            handles.into_iter().map(|handle| handle.join().unwrap()).sum()
        });

        assert_eq!(accepted, 50);
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn reset_stats_keeps_entries() {
        let store = store(&ClockControl::new(), 10);
        store.put("a", Bytes::from_static(b"1"), Ttl::Never);
        let _ = store.get("a");

        store.reset_stats();

        assert_eq!(store.stats(), LocalStats { entries: 1, ..LocalStats::default() });
    }
}
