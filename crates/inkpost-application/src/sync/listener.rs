use inkpost_core::signal::SyncEvent;
use inkpost_infrastructure::Subscription;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// Spawns a task forwarding hub events to `handler` until `target` is
/// dropped or the returned token is cancelled.
///
/// The task only holds a weak reference between events, so a listening
/// store is still freed when its last owner lets go of it.
pub(crate) fn spawn_listener<T, F, Fut>(
    name: &'static str,
    mut subscription: Subscription,
    target: Weak<T>,
    handler: F,
) -> Option<CancellationToken>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, SyncEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            tracing::debug!("[{}] No tokio runtime, sync listener not started", name);
            return None;
        }
    };

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    runtime.spawn(async move {
        tracing::debug!("[{}] Sync listener started", name);
        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(target) = target.upgrade() else {
                break;
            };
            handler(target, event).await;
        }
        tracing::debug!("[{}] Sync listener stopped", name);
    });
    Some(cancel)
}
