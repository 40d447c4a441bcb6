// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mutual exclusion on top of the active backend.
//!
//! Locks come in two variants with different guarantees:
//!
//! - [`DistributedLock`] is acquired with the remote backend's atomic set-if-absent script.
//!   Releasing it runs an atomic delete-if-value-matches script, so only the holder of the
//!   token can release it, even after the lock expired and was taken by someone else.
//! - [`LocalLock`] is acquired in an in-process table while the cache is degraded. Releasing
//!   it removes the record by name **without any ownership check**. It protects only callers
//!   within this process.
//!
//! Releases follow the backend that is active at release time. A distributed lock released
//! after the cache degraded to local does not touch the remote record and returns `false`;
//! the remote record then lives until it expires. The same happens to a local lock released
//! after the remote backend was restored.

use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::StreamExt as _;
use lifeboat_remote::RemoteBackend;
use tick::{Clock, PeriodicTimer};
use uuid::Uuid;

use crate::router::Router;
use crate::telemetry::Operation;

/// Pause between two acquisition attempts of [`LockManager::try_lock`].
pub const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A lock held through the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributedLock {
    name: String,
    token: String,
}

impl DistributedLock {
    /// Rebuilds a handle from a lock name and the token returned at acquisition.
    ///
    /// Useful when the release happens in another process. A handle with the wrong token
    /// never releases the lock.
    #[must_use]
    pub fn from_parts(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
        }
    }

    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ownership token stored in the remote backend.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A lock held in the in-process table while the cache is degraded.
///
/// Anyone in this process can release a local lock by name; the token is informational.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalLock {
    name: String,
    token: String,
}

impl LocalLock {
    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the token recorded at acquisition.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A lock returned by [`LockManager::try_lock`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use = "a lock that is never released is held until it expires"]
pub enum Lock {
    /// Acquired through the remote backend, released only with the matching token.
    Distributed(DistributedLock),
    /// Acquired in the in-process table, released by name without ownership check.
    Local(LocalLock),
}

impl Lock {
    /// Returns the lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Distributed(lock) => lock.name(),
            Self::Local(lock) => lock.name(),
        }
    }

    /// Returns the token recorded at acquisition.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Distributed(lock) => lock.token(),
            Self::Local(lock) => lock.token(),
        }
    }

    /// Returns `true` for a [`Lock::Distributed`].
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::Distributed(_))
    }
}

#[derive(Debug)]
struct LockRecord {
    token: String,
    expires_at: Option<Instant>,
}

impl LockRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Acquires and releases named locks on whichever backend is active.
pub struct LockManager<R> {
    router: Arc<Router<R>>,
    table: DashMap<String, LockRecord>,
    clock: Clock,
}

impl<R> std::fmt::Debug for LockManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("local_locks", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl<R: RemoteBackend> LockManager<R> {
    pub(crate) fn new(router: Arc<Router<R>>, clock: Clock) -> Self {
        Self {
            router,
            table: DashMap::new(),
            clock,
        }
    }

    /// Tries to acquire the lock `name` for `ttl`.
    ///
    /// Makes up to `retries + 1` attempts, waiting [`LOCK_RETRY_DELAY`] between them. Each
    /// attempt uses the backend active at that moment. Returns `None` if the lock stayed held
    /// by someone else.
    pub async fn try_lock(&self, name: &str, ttl: Duration, retries: u32) -> Option<Lock> {
        for attempt in 0..=retries {
            if attempt > 0 {
                self.clock.delay(LOCK_RETRY_DELAY).await;
            }

            if let Some(lock) = self.attempt(name, ttl).await {
                tracing::debug!(
                    lock.name = name,
                    lock.distributed = lock.is_distributed(),
                    attempt,
                    "lock acquired"
                );
                return Some(lock);
            }
        }

        tracing::debug!(lock.name = name, retries, "lock is held elsewhere");
        None
    }

    /// Releases `lock` on the backend active now. Returns `true` if a lock was released.
    pub async fn release_lock(&self, lock: &Lock) -> bool {
        let name = lock.name();

        self.router
            .route(
                Operation::ReleaseLock,
                Some(name),
                |remote| remote.delete_if_equals(name, lock.token()),
                |_| self.release_local(name),
            )
            .await
    }

    /// Returns `true` if the in-process table holds a live lock called `name`.
    #[must_use]
    pub fn is_locked_locally(&self, name: &str) -> bool {
        let now = self.clock.instant();
        self.table.get(name).is_some_and(|record| record.is_live(now))
    }

    /// Drops expired records from the in-process table and returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        let now = self.clock.instant();
        let mut removed = 0_u64;
        self.table.retain(|_, record| {
            let live = record.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    async fn attempt(&self, name: &str, ttl: Duration) -> Option<Lock> {
        let token = self.new_token(ttl);
        let remote_token = token.clone();

        self.router
            .route(
                Operation::TryLock,
                Some(name),
                |remote| async move {
                    let acquired = remote.set_if_absent_with_expiry(name, &remote_token, ttl).await?;
                    Ok(acquired.then(|| Lock::Distributed(DistributedLock::from_parts(name, remote_token))))
                },
                |_| self.acquire_local(name, token, ttl),
            )
            .await
    }

    /// Atomic check-and-insert on the local table.
    fn acquire_local(&self, name: &str, token: String, ttl: Duration) -> Option<Lock> {
        let now = self.clock.instant();
        let record = LockRecord {
            token: token.clone(),
            expires_at: now.checked_add(ttl),
        };

        match self.table.entry(name.to_string()) {
            Entry::Occupied(occupied) if occupied.get().is_live(now) => return None,
            Entry::Occupied(mut occupied) => {
                occupied.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }

        Some(Lock::Local(LocalLock {
            name: name.to_string(),
            token,
        }))
    }

    fn release_local(&self, name: &str) -> bool {
        let now = self.clock.instant();
        self.table.remove(name).is_some_and(|(_, record)| record.is_live(now))
    }

    /// Builds a unique token that also encodes the lock's expiry in Unix milliseconds.
    fn new_token(&self, ttl: Duration) -> String {
        let expires_at = self
            .clock
            .system_time()
            .checked_add(ttl)
            .and_then(|deadline| deadline.duration_since(UNIX_EPOCH).ok())
            .map_or(u128::MAX, |since_epoch| since_epoch.as_millis());

        format!("{expires_at}-{}", Uuid::new_v4().simple())
    }
}

impl<R: RemoteBackend + 'static> LockManager<R> {
    /// Returns the loop that purges expired local lock records every `period`.
    ///
    /// The loop stops once the manager is dropped.
    pub(crate) fn run_purger(self: &Arc<Self>, period: Duration) -> impl Future<Output = ()> + Send + 'static {
        let manager = Arc::downgrade(self);
        let mut timer = PeriodicTimer::new(&self.clock, period);

        async move {
            while timer.next().await.is_some() {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let removed = manager.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expired local locks purged");
                }
            }
        }
    }
}
