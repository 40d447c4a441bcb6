// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Loops spawned on the Tokio runtime for the lifetime of a cache.
///
/// Dropping the set aborts every task.
#[derive(Debug, Default)]
pub(crate) struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Spawns `task` on the current runtime. Returns `false` when there is no runtime.
    pub(crate) fn spawn(&self, name: &'static str, task: impl Future<Output = ()> + Send + 'static) -> bool {
        match Handle::try_current() {
            Ok(runtime) => {
                self.handles.lock().push(runtime.spawn(task));
                tracing::debug!(task = name, "background task started");
                true
            }
            Err(_) => {
                tracing::warn!(task = name, "no Tokio runtime available, background task disabled");
                false
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.lock().iter().filter(|handle| !handle.is_finished()).count()
    }

    pub(crate) fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
