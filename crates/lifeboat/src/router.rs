// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use bytes::Bytes;
use lifeboat_local::LocalStore;
use lifeboat_remote::RemoteBackend;

use crate::failover::{Backend, FailoverController};
use crate::stats::OperationCounters;
use crate::telemetry::{Operation, Outcome, Telemetry};

/// Sends each operation to the active backend and retries it locally when the remote fails.
#[derive(Debug)]
pub(crate) struct Router<R> {
    pub(crate) failover: Arc<FailoverController<R>>,
    pub(crate) local: LocalStore<Bytes>,
    pub(crate) counters: OperationCounters,
    telemetry: Telemetry,
}

impl<R: RemoteBackend> Router<R> {
    pub(crate) fn new(failover: Arc<FailoverController<R>>, local: LocalStore<Bytes>, telemetry: Telemetry) -> Self {
        Self {
            failover,
            local,
            counters: OperationCounters::default(),
            telemetry,
        }
    }

    /// Runs `remote` if the remote backend is active, otherwise `local`.
    ///
    /// A remote error is recorded as a failed operation and reported to the failover
    /// controller, then the operation is served by `local`. The caller only ever sees the
    /// final value.
    pub(crate) async fn route<'a, T, F>(
        &'a self,
        operation: Operation,
        key: Option<&str>,
        remote: impl FnOnce(&'a R) -> F,
        local: impl FnOnce(&'a LocalStore<Bytes>) -> T,
    ) -> T
    where
        F: Future<Output = lifeboat_remote::Result<T>>,
    {
        if self.failover.current_backend() == Backend::Remote {
            match remote(self.failover.remote()).await {
                Ok(value) => {
                    self.record(operation, Outcome::Remote);
                    return value;
                }
                Err(error) => {
                    self.record(operation, Outcome::Failed);
                    tracing::warn!(
                        cache.operation = operation.as_str(),
                        cache.key = key,
                        error = %error,
                        "remote operation failed, serving from local store"
                    );
                    self.failover.report_failure();
                }
            }
        }

        self.record(operation, Outcome::Fallback);
        local(&self.local)
    }

    pub(crate) fn record(&self, operation: Operation, outcome: Outcome) {
        self.counters.record(outcome);
        self.telemetry.record(operation, outcome);
    }
}
