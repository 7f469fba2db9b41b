//! State holding primitives shared by the stores.

mod container;
mod guard;

pub use container::StateContainer;
pub use guard::{SyncGuard, SyncGuardToken};
