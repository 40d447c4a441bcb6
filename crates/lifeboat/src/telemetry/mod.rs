// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Operation telemetry: structured log events and optional OpenTelemetry counters.
//!
//! Every routed operation is recorded once per backend attempt, so a remote failure followed
//! by a local retry produces a `failed` record and a `fallback` record.

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{KeyValue, metrics::Counter};

use crate::Backend;

#[cfg(any(feature = "metrics", test))]
pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Set,
    Get,
    Delete,
    DeleteMany,
    HasKey,
    Expire,
    GetExpire,
    Increment,
    TryLock,
    ReleaseLock,
    Clear,
    ClearExpired,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "cache.set",
            Self::Get => "cache.get",
            Self::Delete => "cache.delete",
            Self::DeleteMany => "cache.delete_many",
            Self::HasKey => "cache.has_key",
            Self::Expire => "cache.expire",
            Self::GetExpire => "cache.get_expire",
            Self::Increment => "cache.increment",
            Self::TryLock => "cache.try_lock",
            Self::ReleaseLock => "cache.release_lock",
            Self::Clear => "cache.clear",
            Self::ClearExpired => "cache.clear_expired",
        }
    }
}

/// Which backend served an operation attempt, and whether it worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Served by the remote backend.
    Remote,
    /// Served by the local store.
    Fallback,
    /// The remote backend failed; a fallback record follows.
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Fallback => "fallback",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Telemetry {
    #[cfg(any(feature = "metrics", test))]
    operations: Option<Counter<u64>>,
    #[cfg(any(feature = "metrics", test))]
    transitions: Option<Counter<u64>>,
}

impl Telemetry {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_meter_provider(provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = metrics::create_meter(provider);
        Self {
            operations: Some(metrics::create_operation_counter(&meter)),
            transitions: Some(metrics::create_transition_counter(&meter)),
        }
    }

    pub(crate) fn record(&self, operation: Operation, outcome: Outcome) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.operations {
            counter.add(
                1,
                &[
                    KeyValue::new(attributes::CACHE_OPERATION, operation.as_str()),
                    KeyValue::new(attributes::CACHE_OUTCOME, outcome.as_str()),
                ],
            );
        }

        Self::emit(operation, outcome);
    }

    #[cfg_attr(
        not(any(feature = "metrics", test)),
        expect(unused_variables, reason = "only recorded by the transitions counter")
    )]
    pub(crate) fn record_transition(&self, backend: Backend, manual: bool) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.transitions {
            counter.add(
                1,
                &[
                    KeyValue::new(attributes::CACHE_BACKEND, backend.as_str()),
                    KeyValue::new(attributes::CACHE_TRANSITION_MANUAL, manual),
                ],
            );
        }
    }

    fn emit(operation: Operation, outcome: Outcome) {
        let op = operation.as_str();
        let out = outcome.as_str();

        // Field names match the metric attribute keys.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(cache.operation = op, cache.outcome = out, "cache.event")
            };
        }

        match outcome {
            Outcome::Remote | Outcome::Fallback => emit_event!(debug),
            Outcome::Failed => emit_event!(info),
        }
    }
}
