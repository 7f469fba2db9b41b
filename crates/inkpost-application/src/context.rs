use inkpost_core::clock::{Clock, SystemClock};
use inkpost_core::remote::RemoteStore;
use inkpost_infrastructure::BroadcastHub;
use std::sync::Arc;

/// Collaborators shared by every store of one application instance.
///
/// Store instances built from clones of the same context see the same
/// remote backend and the same broadcast hub, which is what makes them
/// siblings for cross-instance sync.
#[derive(Clone)]
pub struct StoreContext {
    pub remote: Arc<dyn RemoteStore>,
    pub hub: BroadcastHub,
    pub clock: Arc<dyn Clock>,
}

impl StoreContext {
    pub fn new(remote: Arc<dyn RemoteStore>, hub: BroadcastHub) -> Self {
        Self {
            remote,
            hub,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
