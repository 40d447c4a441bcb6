// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Selection of the active backend.
//!
//! The controller is a two-state machine. Degrading is fast: a fixed number of consecutive
//! reported failures flips it from [`Backend::Remote`] to [`Backend::Local`]. Recovering is
//! conservative: only a successful health probe flips it back, never an incidental
//! successful call.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{FutureExt as _, StreamExt as _};
use lifeboat_remote::RemoteBackend;
use parking_lot::Mutex;
use tick::{Clock, PeriodicTimer};

use crate::telemetry::Telemetry;

/// The backend that currently serves cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The shared remote backend.
    Remote,
    /// The in-process local store.
    Local,
}

impl Backend {
    /// Returns the lowercase name of the backend.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend name that is neither `remote` nor `local`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache backend '{0}', expected 'remote' or 'local'")]
pub struct UnknownBackend(String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    /// Parses `remote` (alias `redis`) or `local` (alias `memory`), ignoring case.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "remote" | "redis" => Ok(Self::Remote),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(UnknownBackend(name.to_string())),
        }
    }
}

/// The effect of a call on the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Switched from remote to local.
    Degraded,
    /// Switched from local to remote.
    Restored,
    /// The active backend did not change.
    Unchanged,
}

#[derive(Debug)]
struct FailoverState {
    active: Backend,
    consecutive_failures: u32,
    last_probe_at: Option<Instant>,
}

impl FailoverState {
    fn record_failure(&mut self, threshold: u32) -> Transition {
        match self.active {
            // Late results from calls that started before the switch.
            Backend::Local => Transition::Unchanged,
            Backend::Remote => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);

                if self.consecutive_failures >= threshold {
                    self.active = Backend::Local;
                    self.consecutive_failures = 0;
                    Transition::Degraded
                } else {
                    Transition::Unchanged
                }
            }
        }
    }

    fn record_probe(&mut self, healthy: bool, now: Instant, threshold: u32) -> Transition {
        self.last_probe_at = Some(now);

        match (self.active, healthy) {
            (Backend::Local, true) => {
                self.active = Backend::Remote;
                self.consecutive_failures = 0;
                Transition::Restored
            }
            (Backend::Remote, true) => {
                self.consecutive_failures = 0;
                Transition::Unchanged
            }
            (Backend::Remote, false) => self.record_failure(threshold),
            (Backend::Local, false) => Transition::Unchanged,
        }
    }

    fn force(&mut self, backend: Backend) -> Transition {
        let previous = self.active;
        self.active = backend;
        self.consecutive_failures = 0;

        match (previous, backend) {
            (Backend::Remote, Backend::Local) => Transition::Degraded,
            (Backend::Local, Backend::Remote) => Transition::Restored,
            _ => Transition::Unchanged,
        }
    }
}

/// Owns the choice between the remote backend and the local store.
///
/// State and failure counter are updated together under one lock, so concurrent callers
/// reporting the final failures observe exactly one [`Transition::Degraded`].
pub struct FailoverController<R> {
    remote: Arc<R>,
    state: Mutex<FailoverState>,
    threshold: u32,
    clock: Clock,
    telemetry: Telemetry,
}

impl<R> fmt::Debug for FailoverController<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverController")
            .field("state", &self.state)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl<R: RemoteBackend> FailoverController<R> {
    /// Creates the controller and runs the initial probe to pick the starting backend.
    pub(crate) async fn start(remote: Arc<R>, threshold: u32, clock: Clock, telemetry: Telemetry) -> Self {
        let controller = Self {
            remote,
            state: Mutex::new(FailoverState {
                active: Backend::Local,
                consecutive_failures: 0,
                last_probe_at: None,
            }),
            threshold: threshold.max(1),
            clock,
            telemetry,
        };

        let healthy = controller.ping().await;
        let now = controller.clock.instant();
        controller.state.lock().record_probe(healthy, now, controller.threshold);

        tracing::info!(cache.backend = %controller.current_backend(), "initial cache backend selected");
        controller
    }

    /// Returns the remote backend.
    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the backend that should serve the next operation.
    #[must_use]
    pub fn current_backend(&self) -> Backend {
        self.state.lock().active
    }

    /// Returns the number of remote failures reported since the last reset.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Returns the number of consecutive failures that degrades to the local store.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.threshold
    }

    /// Returns when the last health probe finished, if one has run.
    #[must_use]
    pub fn last_probe_at(&self) -> Option<Instant> {
        self.state.lock().last_probe_at
    }

    /// Reports a failed remote operation.
    ///
    /// Reaching the threshold switches to the local store and resets the counter. Reports
    /// received while already local are ignored.
    pub fn report_failure(&self) -> Transition {
        let transition = self.state.lock().record_failure(self.threshold);

        if transition == Transition::Degraded {
            tracing::warn!(
                cache.backend = %Backend::Local,
                threshold = self.threshold,
                "remote backend failed repeatedly, switching to local store"
            );
            self.telemetry.record_transition(Backend::Local, false);
        }
        transition
    }

    /// Probes the remote backend and applies the result. Returns `true` if it is healthy.
    ///
    /// A healthy probe restores the remote backend or resets the failure counter. An
    /// unhealthy probe counts as a reported failure while remote and changes nothing while
    /// local.
    pub async fn probe(&self) -> bool {
        let healthy = self.ping().await;
        let now = self.clock.instant();
        let transition = self.state.lock().record_probe(healthy, now, self.threshold);

        match transition {
            Transition::Restored => {
                tracing::info!(cache.backend = %Backend::Remote, "health probe succeeded, switching back to remote backend");
                self.telemetry.record_transition(Backend::Remote, false);
            }
            Transition::Degraded => {
                tracing::warn!(cache.backend = %Backend::Local, "health probe failed, switching to local store");
                self.telemetry.record_transition(Backend::Local, false);
            }
            Transition::Unchanged => {}
        }
        healthy
    }

    async fn ping(&self) -> bool {
        match AssertUnwindSafe(self.remote.ping()).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::debug!(error = %error, "health probe failed");
                false
            }
            Err(_) => {
                tracing::error!("health probe panicked");
                false
            }
        }
    }

    /// Switches to `backend` immediately, bypassing threshold and probe.
    pub fn force(&self, backend: Backend) -> Transition {
        let transition = self.state.lock().force(backend);

        tracing::warn!(cache.backend = %backend, manual = true, "cache backend switched manually");
        if transition != Transition::Unchanged {
            self.telemetry.record_transition(backend, true);
        }
        transition
    }

    /// Switches to the backend called `name`.
    ///
    /// Unknown names are logged as errors and change nothing; the return value is `false`
    /// in that case.
    pub fn force_named(&self, name: &str) -> bool {
        match name.parse::<Backend>() {
            Ok(backend) => {
                self.force(backend);
                true
            }
            Err(error) => {
                tracing::error!(error = %error, "ignoring request to force an unknown cache backend");
                false
            }
        }
    }

    pub(crate) fn reset_failures(&self) {
        self.state.lock().consecutive_failures = 0;
    }
}

impl<R: RemoteBackend + 'static> FailoverController<R> {
    /// Returns a future that probes the remote backend every `period`.
    ///
    /// The future completes once the controller is dropped.
    pub(crate) fn run_prober(self: &Arc<Self>, period: Duration) -> impl Future<Output = ()> + Send + 'static {
        let controller = Arc::downgrade(self);
        let mut timer = PeriodicTimer::new(&self.clock, period);

        async move {
            while timer.next().await.is_some() {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.probe().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lifeboat_remote::testing::{MockRemote, RemoteOp};
    use lifeboat_remote::Unconfigured;
    use rstest::rstest;
    use tick::ClockControl;

    use super::*;
    use crate::telemetry::testing::LogCapture;

    async fn controller(remote: &MockRemote, threshold: u32) -> FailoverController<MockRemote> {
        FailoverController::start(Arc::new(remote.clone()), threshold, Clock::new_frozen(), Telemetry::default()).await
    }

    #[tokio::test]
    async fn initial_probe_picks_remote_when_healthy() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;

        assert_eq!(controller.current_backend(), Backend::Remote);
        assert!(controller.last_probe_at().is_some());
    }

    #[tokio::test]
    async fn initial_probe_picks_local_when_unreachable() {
        let remote = MockRemote::new(&Clock::new_frozen());
        remote.fail_when(|op| matches!(op, RemoteOp::Ping));

        assert_eq!(controller(&remote, 3).await.current_backend(), Backend::Local);
    }

    #[tokio::test]
    async fn absent_backend_starts_local() {
        let controller = FailoverController::start(Arc::new(Unconfigured), 3, Clock::new_frozen(), Telemetry::default()).await;

        assert_eq!(controller.current_backend(), Backend::Local);
        assert!(!controller.probe().await);
        assert_eq!(controller.current_backend(), Backend::Local);
    }

    #[rstest]
    #[case::below_threshold(2, Backend::Remote)]
    #[case::at_threshold(3, Backend::Local)]
    #[tokio::test]
    async fn failures_degrade_at_threshold(#[case] failures: u32, #[case] expected: Backend) {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;

        for _ in 0..failures {
            controller.report_failure();
        }

        assert_eq!(controller.current_backend(), expected);
    }

    #[tokio::test]
    async fn degrading_resets_counter_and_ignores_late_failures() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;

        assert_eq!(controller.report_failure(), Transition::Unchanged);
        assert_eq!(controller.report_failure(), Transition::Unchanged);
        assert_eq!(controller.report_failure(), Transition::Degraded);
        assert_eq!(controller.consecutive_failures(), 0);

        assert_eq!(controller.report_failure(), Transition::Unchanged);
        assert_eq!(controller.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn only_a_probe_restores_remote() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 1).await;
        controller.report_failure();
        assert_eq!(controller.current_backend(), Backend::Local);

        // A successful call made directly against the backend does not count.
        remote.get("k").await.unwrap();
        assert_eq!(controller.current_backend(), Backend::Local);

        assert!(controller.probe().await);
        assert_eq!(controller.current_backend(), Backend::Remote);
    }

    #[tokio::test]
    async fn healthy_probe_resets_counter_while_remote() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;
        controller.report_failure();
        controller.report_failure();

        controller.probe().await;

        assert_eq!(controller.consecutive_failures(), 0);
        controller.report_failure();
        assert_eq!(controller.current_backend(), Backend::Remote);
    }

    #[tokio::test]
    async fn failed_probe_counts_as_failure_while_remote() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 2).await;
        remote.fail_when(|op| matches!(op, RemoteOp::Ping));

        assert!(!controller.probe().await);
        assert_eq!(controller.consecutive_failures(), 1);
        assert!(!controller.probe().await);
        assert_eq!(controller.current_backend(), Backend::Local);

        assert!(!controller.probe().await);
        assert_eq!(controller.current_backend(), Backend::Local);
    }

    #[tokio::test]
    async fn force_bypasses_threshold_and_probe() {
        let remote = MockRemote::new(&Clock::new_frozen());
        remote.fail_when(|_| true);
        let controller = controller(&remote, 3).await;
        assert_eq!(controller.current_backend(), Backend::Local);

        assert_eq!(controller.force(Backend::Remote), Transition::Restored);
        assert_eq!(controller.current_backend(), Backend::Remote);
        assert_eq!(controller.force(Backend::Remote), Transition::Unchanged);
        assert_eq!(controller.force(Backend::Local), Transition::Degraded);
    }

    #[rstest]
    #[case::remote("remote", Some(Backend::Remote))]
    #[case::redis_alias("REDIS", Some(Backend::Remote))]
    #[case::local("local", Some(Backend::Local))]
    #[case::memory_alias(" Memory ", Some(Backend::Local))]
    #[case::unknown("disk", None)]
    fn backend_names(#[case] name: &str, #[case] expected: Option<Backend>) {
        assert_eq!(name.parse::<Backend>().ok(), expected);
    }

    #[tokio::test]
    async fn force_named_ignores_unknown_names() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;

        assert!(!controller.force_named("disk"));
        assert_eq!(controller.current_backend(), Backend::Remote);

        assert!(controller.force_named("memory"));
        assert_eq!(controller.current_backend(), Backend::Local);
    }

    #[tokio::test]
    async fn concurrent_failures_degrade_exactly_once() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = Arc::new(controller(&remote, 3).await);

        let degraded = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let controller = Arc::clone(&controller);
                    scope.spawn(move || controller.report_failure() == Transition::Degraded)
                })
                .collect();

            handles.into_iter().map(|handle| handle.join().unwrap()).filter(|degraded| *degraded).count()
        });

        assert_eq!(degraded, 1);
        assert_eq!(controller.current_backend(), Backend::Local);
    }

    #[tokio::test]
    async fn prober_restores_remote_on_schedule() {
        let control = ClockControl::new();
        let remote = MockRemote::new(&control.to_clock());
        remote.fail_when(|_| true);

        let controller = Arc::new(
            FailoverController::start(Arc::new(remote.clone()), 3, control.to_clock(), Telemetry::default()).await,
        );
        assert_eq!(controller.current_backend(), Backend::Local);

        let prober = tokio::spawn(controller.run_prober(Duration::from_secs(30)));
        tokio::task::yield_now().await;
        remote.clear_failures();

        control.advance(Duration::from_secs(30));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(controller.current_backend(), Backend::Remote);
        prober.abort();
    }

    #[tokio::test]
    async fn manual_switch_is_logged_as_warning() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        controller.force(Backend::Local);

        capture.assert_contains("WARN");
        capture.assert_contains("cache backend switched manually");
        capture.assert_contains("manual=true");
    }

    #[tokio::test]
    async fn threshold_degrade_is_logged_without_manual_flag() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 2).await;
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        controller.report_failure();
        controller.report_failure();

        capture.assert_contains("WARN");
        capture.assert_contains("remote backend failed repeatedly");
        capture.assert_contains("threshold=2");
        assert!(!capture.output().contains("manual"));
    }

    #[tokio::test]
    async fn unknown_backend_name_is_logged_as_error() {
        let remote = MockRemote::new(&Clock::new_frozen());
        let controller = controller(&remote, 3).await;
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        assert!(!controller.force_named("disk"));

        capture.assert_contains("ERROR");
        capture.assert_contains("ignoring request to force an unknown cache backend");
        assert_eq!(controller.current_backend(), Backend::Remote);
    }
}
