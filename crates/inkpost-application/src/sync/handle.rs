use std::future::Future;
use tokio::task::JoinHandle;

/// Handle to a fire-and-forget remote sync.
///
/// Store actions apply their local mutation before returning and dispatch
/// the remote write in the background. Callers may drop the handle, or
/// await [`SyncHandle::settled`] when they need the write to have finished
/// (successfully or not; failures are absorbed by the store).
#[derive(Debug, Default)]
pub struct SyncHandle {
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// A handle for a sync that was not dispatched (guarded, fallback mode
    /// or no runtime).
    pub fn skipped() -> Self {
        Self { task: None }
    }

    /// Spawns `future` on the current tokio runtime.
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: spawn_detached(future),
        }
    }

    /// True when a remote write was dispatched.
    pub fn is_dispatched(&self) -> bool {
        self.task.is_some()
    }

    /// Waits for the dispatched write to finish.
    pub async fn settled(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!("[SyncHandle] Sync task did not complete: {}", e);
            }
        }
    }
}

/// Spawns on the current runtime, or logs and drops the future when called
/// outside of one.
pub(crate) fn spawn_detached<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            tracing::error!("[SyncHandle] No tokio runtime available, background task dropped");
            None
        }
    }
}
