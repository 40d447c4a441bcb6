// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Remote backend abstraction for the `lifeboat` resilient cache.
//!
//! This crate defines the [`RemoteBackend`] trait: the calls the cache layer issues against a
//! shared, networked key-value service. Implementations report every failure as an [`Error`];
//! it is up to the caller to decide whether to retry, degrade, or give up.
//!
//! # Implementing a Remote Backend
//!
//! Only [`RemoteBackend::ping`] has a default implementation, which performs a write, read and
//! delete round trip of a sentinel key. Backends with a cheaper native health check should
//! override it.
//!
//! # Features
//!
//! - `redis`: [`RedisBackend`], built on a multiplexed `redis` connection manager.
//! - `test-util`: [`testing::MockRemote`], an in-memory backend with failure injection.

mod backend;
mod error;
#[cfg(feature = "redis")]
mod redis;
mod unconfigured;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{Expiration, HEALTH_PROBE_KEY, RemoteBackend};
pub use error::{Error, Result};
#[cfg(feature = "redis")]
pub use redis::RedisBackend;
pub use unconfigured::Unconfigured;
