// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Backend;
use crate::telemetry::Outcome;

/// A snapshot of cache activity, returned by [`Cache::stats`](crate::Cache::stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// `remote_ops + fallback_ops + failed_ops`.
    pub total_ops: u64,
    /// Operations served by the remote backend.
    pub remote_ops: u64,
    /// Operations served by the local store.
    pub fallback_ops: u64,
    /// Remote operations that failed and were retried locally.
    pub failed_ops: u64,
    /// The backend serving operations right now.
    pub active_backend: Backend,
    /// Live entries in the local store.
    pub size: u64,
    /// Remote failures reported since the last reset.
    pub consecutive_failures: u32,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backend={} total={} remote={} fallback={} failed={} consecutive_failures={} size={}",
            self.active_backend,
            self.total_ops,
            self.remote_ops,
            self.fallback_ops,
            self.failed_ops,
            self.consecutive_failures,
            self.size
        )
    }
}

/// Monotonic operation counters. Only an explicit reset sets them back to zero.
#[derive(Debug, Default)]
pub(crate) struct OperationCounters {
    remote: AtomicU64,
    fallback: AtomicU64,
    failed: AtomicU64,
}

impl OperationCounters {
    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Remote => &self.remote,
            Outcome::Fallback => &self.fallback,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active_backend: Backend, size: u64, consecutive_failures: u32) -> CacheStats {
        let remote_ops = self.remote.load(Ordering::Relaxed);
        let fallback_ops = self.fallback.load(Ordering::Relaxed);
        let failed_ops = self.failed.load(Ordering::Relaxed);

        CacheStats {
            total_ops: remote_ops + fallback_ops + failed_ops,
            remote_ops,
            fallback_ops,
            failed_ops,
            active_backend,
            size,
            consecutive_failures,
        }
    }

    pub(crate) fn reset(&self) {
        self.remote.store(0, Ordering::Relaxed);
        self.fallback.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}
