// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A resilient cache and locking layer.
//!
//! [`Cache`] serves key-value operations and named locks from a shared remote backend, such as
//! Redis, and keeps working when that backend becomes unreachable. Each failed remote call is
//! transparently retried against a bounded in-process [`LocalStore`]; after a configurable number
//! of consecutive failures the cache stops calling the remote backend altogether. A periodic
//! health probe switches it back once the remote backend answers again.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use lifeboat::{Backend, Cache, Ttl};
//! use tick::Clock;
//!
//! # async fn example() {
//! // Without a remote backend the cache starts on its local store.
//! let cache = Cache::builder(Clock::new_tokio()).build().await;
//! assert_eq!(cache.active_backend(), Backend::Local);
//!
//! cache.set("user:42", "Ada", Ttl::minutes(10)).await;
//! assert!(cache.has_key("user:42").await);
//!
//! if let Some(lock) = cache.try_lock("report", Duration::from_secs(30), 3).await {
//!     // ... exclusive work ...
//!     cache.release_lock(&lock).await;
//! }
//! # }
//! ```
//!
//! # Backends
//!
//! The remote backend is any [`RemoteBackend`]. With the `redis` feature [`RedisBackend`] talks
//! to a Redis server; with the `test-util` feature [`testing::MockRemote`] provides an
//! in-memory backend with failure injection.
//!
//! Not every operation has the same meaning on both backends:
//!
//! | Operation | Remote | Local |
//! |-----------|--------|-------|
//! | [`Cache::expire`] | updates the TTL | logs a warning, returns `false` |
//! | [`Cache::get_expire`] | remaining TTL | [`Expiration::Unknown`] |
//! | [`Cache::clear`] | flushes the whole database | empties the local store |
//! | [`Cache::try_lock`] | [`DistributedLock`] | [`LocalLock`], process-wide only |
//! | [`Cache::release_lock`] | checks the token | no ownership check |
//!
//! Values written to one backend are not copied to the other. After a switch, reads may miss
//! until the values are written again.
//!
//! # Failover
//!
//! The [`FailoverController`] decides which backend serves each call:
//!
//! - Starting up, one health probe picks the initial backend.
//! - While remote, every failed operation increments a counter. Reaching
//!   [`CacheOptions::failure_threshold`] switches to local and resets the counter.
//! - While local, only a successful probe switches back, either from the background loop every
//!   [`CacheOptions::health_probe_interval`] or from [`Cache::check_health_now`].
//! - [`Cache::force_remote`] and [`Cache::force_local`] switch immediately.
//!
//! # Features
//!
//! - `metrics`: records `lifeboat.operation.count` and `lifeboat.backend.transition.count`
//!   through an OpenTelemetry meter provider passed to [`CacheBuilder::metrics`].
//! - `redis`: enables [`RedisBackend`].
//! - `serde`: derives `Serialize` and `Deserialize` for [`CacheOptions`].
//! - `test-util`: enables [`testing`] and the `tick` clock control.
//!
//! # Logging
//!
//! Events are emitted with [`tracing`](https://docs.rs/tracing): remote failures and backend
//! switches at `warn`, restored backends at `info`, routine routing at `debug`.

mod background;
mod builder;
mod cache;
mod failover;
mod lock;
mod options;
mod router;
mod stats;
mod telemetry;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use failover::{Backend, FailoverController, Transition, UnknownBackend};
pub use lifeboat_local::{LocalStats, LocalStore, Ttl};
#[cfg(feature = "redis")]
pub use lifeboat_remote::RedisBackend;
#[cfg(feature = "test-util")]
pub use lifeboat_remote::testing;
pub use lifeboat_remote::{Error, Expiration, RemoteBackend, Unconfigured};
pub use lock::{DistributedLock, LOCK_RETRY_DELAY, LocalLock, Lock, LockManager};
pub use options::{
    CacheOptions, DEFAULT_CLEANUP_INTERVAL, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HEALTH_PROBE_INTERVAL, DEFAULT_MAX_LOCAL_ENTRIES,
    DEFAULT_TTL,
};
pub use stats::CacheStats;
