// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lifeboat_local::LocalStore;
use lifeboat_remote::{RemoteBackend, Unconfigured};
use tick::Clock;

use crate::background::BackgroundTasks;
use crate::cache::Cache;
use crate::failover::FailoverController;
use crate::lock::LockManager;
use crate::options::CacheOptions;
use crate::router::Router;
use crate::telemetry::Telemetry;

/// Builder for [`Cache`], created by [`Cache::builder`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use lifeboat::Cache;
/// use tick::Clock;
///
/// # async fn example() {
/// let cache = Cache::builder(Clock::new_tokio())
///     .max_local_entries(500)
///     .failure_threshold(5)
///     .health_probe_interval(Duration::from_secs(10))
///     .build()
///     .await;
/// # }
/// ```
#[derive(Debug)]
#[must_use]
pub struct CacheBuilder<R = Unconfigured> {
    remote: R,
    clock: Clock,
    options: CacheOptions,
    telemetry: Telemetry,
}

impl CacheBuilder<Unconfigured> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            remote: Unconfigured,
            clock,
            options: CacheOptions::default(),
            telemetry: Telemetry::default(),
        }
    }
}

impl<R> CacheBuilder<R> {
    /// Sets the remote backend.
    pub fn remote<R2: RemoteBackend>(self, remote: R2) -> CacheBuilder<R2> {
        CacheBuilder {
            remote,
            clock: self.clock,
            options: self.options,
            telemetry: self.telemetry,
        }
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets [`CacheOptions::max_local_entries`].
    pub fn max_local_entries(mut self, max_local_entries: usize) -> Self {
        self.options.max_local_entries = max_local_entries;
        self
    }

    /// Sets [`CacheOptions::default_ttl`].
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.options.default_ttl = ttl;
        self
    }

    /// Sets [`CacheOptions::cleanup_interval`]. Zero disables the background sweep.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.options.cleanup_interval = interval;
        self
    }

    /// Sets [`CacheOptions::failure_threshold`]. Values below one are raised to one.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.options.failure_threshold = threshold;
        self
    }

    /// Sets [`CacheOptions::health_probe_interval`]. Zero disables the background probe.
    pub fn health_probe_interval(mut self, interval: Duration) -> Self {
        self.options.health_probe_interval = interval;
        self
    }

    /// Sets [`CacheOptions::background_tasks`].
    pub fn background_tasks(mut self, enabled: bool) -> Self {
        self.options.background_tasks = enabled;
        self
    }

    /// Reports operation and backend transition counters to `provider`.
    #[cfg(any(feature = "metrics", test))]
    pub fn metrics(mut self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.telemetry = Telemetry::with_meter_provider(provider);
        self
    }
}

impl<R: RemoteBackend + 'static> CacheBuilder<R> {
    /// Builds the cache.
    ///
    /// Probes the remote backend once to pick the starting backend, then spawns the health
    /// probe loop and the cleanup loops on the current Tokio runtime if background tasks are
    /// enabled. Cleanup sweeps both the local store and the local lock table.
    pub async fn build(self) -> Cache<R> {
        let Self {
            remote,
            clock,
            options,
            telemetry,
        } = self;

        let local = LocalStore::<Bytes>::builder(clock.clone())
            .max_entries(options.max_local_entries)
            .default_ttl(options.default_ttl)
            .name("lifeboat")
            .build();

        let failover = Arc::new(
            FailoverController::start(Arc::new(remote), options.failure_threshold, clock.clone(), telemetry.clone()).await,
        );

        let router = Arc::new(Router::new(failover, local, telemetry));
        let locks = Arc::new(LockManager::new(Arc::clone(&router), clock));

        let background = BackgroundTasks::default();
        if options.background_tasks {
            if !options.health_probe_interval.is_zero() {
                background.spawn("health_probe", router.failover.run_prober(options.health_probe_interval));
            }
            if !options.cleanup_interval.is_zero() {
                background.spawn("local_sweep", router.local.run_sweeper(options.cleanup_interval));
                background.spawn("lock_purge", locks.run_purger(options.cleanup_interval));
            }
        }

        Cache::from_parts(router, locks, options, background)
    }
}
