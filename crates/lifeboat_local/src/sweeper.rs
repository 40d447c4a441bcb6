// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Periodic removal of expired entries.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tick::PeriodicTimer;

use crate::LocalStore;

impl<V> LocalStore<V>
where
    V: Send + Sync + 'static,
{
    /// Returns a future that sweeps expired entries every `period`.
    ///
    /// The future holds only a weak reference to the store and completes once every
    /// [`LocalStore`] handle has been dropped. A panic during one sweep is logged and the loop
    /// carries on with the next tick.
    ///
    /// The caller chooses where to run the future, typically by spawning it on the async
    /// runtime.
    pub fn run_sweeper(&self, period: Duration) -> impl Future<Output = ()> + Send + 'static {
        let store = Arc::downgrade(&self.inner);
        let mut timer = PeriodicTimer::new(self.inner.clock(), period);

        async move {
            while timer.next().await.is_some() {
                let Some(inner) = store.upgrade() else {
                    break;
                };

                if catch_unwind(AssertUnwindSafe(|| inner.sweep())).is_err() {
                    tracing::error!(cache.name = %inner.name(), "expired entry sweep panicked");
                }
            }
        }
    }
}
