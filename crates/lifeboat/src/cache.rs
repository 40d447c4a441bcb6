// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lifeboat_local::{LocalStats, LocalStore, Ttl};
use lifeboat_remote::{Expiration, RemoteBackend, Unconfigured};
use tick::Clock;

use crate::background::BackgroundTasks;
use crate::builder::CacheBuilder;
use crate::failover::{Backend, FailoverController};
use crate::lock::{Lock, LockManager};
use crate::options::CacheOptions;
use crate::router::Router;
use crate::stats::CacheStats;
use crate::telemetry::{Operation, Outcome};

/// A key-value cache that serves from a remote backend and falls back to an in-process store.
///
/// Every operation goes to the backend that is active at call time. When the remote backend
/// fails, the operation is retried against the local store and the failure is counted; after
/// [`CacheOptions::failure_threshold`] failures the cache switches to the local store until a
/// health probe succeeds. Callers never see remote errors: a failed lookup reads as a miss and
/// a failed write reads as `false` only if the local store also refuses it.
///
/// Cloning is cheap and every clone shares the same state.
///
/// # Examples
///
/// ```
/// use lifeboat::{Cache, Ttl};
/// use tick::Clock;
///
/// # async fn example() {
/// let cache = Cache::builder(Clock::new_tokio()).build().await;
///
/// cache.set("greeting", "hello", Ttl::minutes(5)).await;
/// assert_eq!(cache.get("greeting").await.as_deref(), Some(&b"hello"[..]));
/// # }
/// ```
pub struct Cache<R = Unconfigured> {
    inner: Arc<CacheInner<R>>,
}

struct CacheInner<R> {
    router: Arc<Router<R>>,
    locks: Arc<LockManager<R>>,
    options: CacheOptions,
    background: BackgroundTasks,
}

impl<R> Clone for Cache<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for Cache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("failover", &self.inner.router.failover)
            .field("local", &self.inner.router.local)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Cache<Unconfigured> {
    /// Starts building a cache without a remote backend.
    ///
    /// Call [`CacheBuilder::remote`] to attach one.
    #[must_use]
    pub fn builder(clock: Clock) -> CacheBuilder<Unconfigured> {
        CacheBuilder::new(clock)
    }
}

impl<R: RemoteBackend> Cache<R> {
    pub(crate) fn from_parts(
        router: Arc<Router<R>>,
        locks: Arc<LockManager<R>>,
        options: CacheOptions,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                router,
                locks,
                options,
                background,
            }),
        }
    }

    fn router(&self) -> &Router<R> {
        &self.inner.router
    }

    /// Stores `value` under `key`. Returns `false` if the value could not be stored anywhere.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>, ttl: impl Into<Ttl>) -> bool {
        let value = value.into();
        let ttl = ttl.into();
        let remote_value = value.clone();
        let remote_ttl = ttl.resolve(self.inner.options.default_ttl());

        self.router()
            .route(
                Operation::Set,
                Some(key),
                |remote| async move {
                    remote.set(key, remote_value, remote_ttl).await?;
                    Ok(true)
                },
                |local| local.put(key, value, ttl),
            )
            .await
    }

    /// Returns the value stored under `key`, or `None` if it is absent or expired.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.router()
            .route(Operation::Get, Some(key), |remote| remote.get(key), |local| local.get(key))
            .await
    }

    /// Deletes `key`. Returns `true` if a live value was removed.
    pub async fn delete(&self, key: &str) -> bool {
        self.router()
            .route(Operation::Delete, Some(key), |remote| remote.delete(key), |local| local.remove(key))
            .await
    }

    /// Deletes every key in `keys` and returns how many live values were removed.
    pub async fn delete_many<K: AsRef<str> + Sync>(&self, keys: &[K]) -> u64 {
        if keys.is_empty() {
            return 0;
        }

        let owned: Vec<String> = keys.iter().map(|key| key.as_ref().to_owned()).collect();

        self.router()
            .route(
                Operation::DeleteMany,
                None,
                |remote| async move { remote.delete_many(&owned).await },
                |local| local.remove_many(keys),
            )
            .await
    }

    /// Returns `true` if a live value is stored under `key`.
    pub async fn has_key(&self, key: &str) -> bool {
        self.router()
            .route(Operation::HasKey, Some(key), |remote| remote.has_key(key), |local| local.contains_key(key))
            .await
    }

    /// Sets the remaining lifetime of `key` to `ttl`.
    ///
    /// Only the remote backend supports this. On the local store the call is logged and
    /// returns `false`, as does a zero `ttl`.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }

        self.router()
            .route(
                Operation::Expire,
                Some(key),
                |remote| remote.expire(key, ttl),
                |_| {
                    tracing::warn!(cache.key = key, "expire is not supported by the local store");
                    false
                },
            )
            .await
    }

    /// Returns the remaining lifetime of `key`.
    ///
    /// The local store cannot report lifetimes and answers [`Expiration::Unknown`].
    pub async fn get_expire(&self, key: &str) -> Expiration {
        self.router()
            .route(
                Operation::GetExpire,
                Some(key),
                |remote| remote.time_to_live(key),
                |_| {
                    tracing::warn!(cache.key = key, "get_expire is not supported by the local store");
                    Expiration::Unknown
                },
            )
            .await
    }

    /// Adds `delta` to the integer stored under `key` and returns the new value.
    ///
    /// A missing key counts from zero. Returns `None` if the stored value is not an integer,
    /// the result overflows, or the local store is full.
    pub async fn increment(&self, key: &str, delta: i64) -> Option<i64> {
        self.router()
            .route(
                Operation::Increment,
                Some(key),
                |remote| async move { remote.increment(key, delta).await.map(Some) },
                |local| local.increment(key, delta),
            )
            .await
    }

    /// Subtracts `delta` from the integer stored under `key` and returns the new value.
    pub async fn decrement(&self, key: &str, delta: i64) -> Option<i64> {
        self.increment(key, delta.checked_neg()?).await
    }

    /// Tries to acquire the lock `name`. See [`LockManager::try_lock`].
    pub async fn try_lock(&self, name: &str, ttl: Duration, retries: u32) -> Option<Lock> {
        self.inner.locks.try_lock(name, ttl, retries).await
    }

    /// Releases `lock`. See [`LockManager::release_lock`].
    pub async fn release_lock(&self, lock: &Lock) -> bool {
        self.inner.locks.release_lock(lock).await
    }

    /// Removes every value from the active backend.
    ///
    /// On the remote backend this flushes the whole database, including keys written by
    /// other applications.
    pub async fn clear(&self) {
        self.router()
            .route(
                Operation::Clear,
                None,
                |remote| {
                    tracing::warn!("flushing the remote cache database");
                    remote.flush()
                },
                LocalStore::clear,
            )
            .await;
    }

    /// Drops expired entries from the local store and the local lock table.
    ///
    /// Returns how many entries were removed. The remote backend expires keys on its own.
    pub fn clear_expired(&self) -> u64 {
        self.router().record(Operation::ClearExpired, Outcome::Fallback);
        let entries = self.router().local.sweep();
        let locks = self.inner.locks.purge_expired();
        tracing::debug!(entries, locks, "expired local entries cleared");
        entries + locks
    }

    /// Probes the remote backend now. Returns `true` if it is healthy.
    pub async fn check_health_now(&self) -> bool {
        self.router().failover.probe().await
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let router = self.router();
        let failover = &router.failover;
        router.counters.snapshot(
            failover.current_backend(),
            u64::try_from(router.local.len()).unwrap_or(u64::MAX),
            failover.consecutive_failures(),
        )
    }

    /// Returns the hit and miss counters of the local store.
    #[must_use]
    pub fn local_stats(&self) -> LocalStats {
        self.router().local.stats()
    }

    /// Zeroes the operation counters, the local store counters and the failure counter.
    pub fn reset_stats(&self) {
        let router = self.router();
        router.counters.reset();
        router.local.reset_stats();
        router.failover.reset_failures();
    }

    /// Switches to the remote backend without waiting for a health probe.
    pub fn force_remote(&self) {
        self.router().failover.force(Backend::Remote);
    }

    /// Switches to the local store regardless of the failure count.
    pub fn force_local(&self) {
        self.router().failover.force(Backend::Local);
    }

    /// Switches to the backend called `name`, such as `"redis"` or `"memory"`.
    ///
    /// Returns `false` and changes nothing if the name is not recognized.
    pub fn force_backend(&self, name: &str) -> bool {
        self.router().failover.force_named(name)
    }

    /// Returns the backend serving operations right now.
    #[must_use]
    pub fn active_backend(&self) -> Backend {
        self.router().failover.current_backend()
    }

    /// Returns the failover controller.
    #[must_use]
    pub fn failover(&self) -> &FailoverController<R> {
        &self.router().failover
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager<R> {
        &self.inner.locks
    }

    /// Returns the local store used while the remote backend is unavailable.
    #[must_use]
    pub fn local(&self) -> &LocalStore<Bytes> {
        &self.router().local
    }

    /// Returns the options the cache was built with.
    #[must_use]
    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Stops the background probe and sweep loops.
    ///
    /// The cache keeps working; expired local entries are then only dropped when read or by
    /// [`Cache::clear_expired`], and the remote backend is only restored by
    /// [`Cache::check_health_now`] or [`Cache::force_remote`].
    pub fn shutdown(&self) {
        self.inner.background.shutdown();
        tracing::debug!("cache background tasks stopped");
    }

    #[cfg(test)]
    pub(crate) fn background_task_count(&self) -> usize {
        self.inner.background.len()
    }
}
