//! Background sync plumbing: dispatch handles, connectivity tracking and
//! token refresh timers.

mod connectivity;
mod handle;
mod listener;
mod refresh;

pub use connectivity::{ConnectivityMonitor, ConnectivityState, Transition};
pub use handle::SyncHandle;
pub use refresh::{RefreshScheduler, ScheduleOutcome};

pub(crate) use listener::spawn_listener;
