//! Session store.
//!
//! Authentication/session state mirrored to the remote backend, with token
//! refresh scheduling and cross-instance sync.

mod store;

pub use store::SessionStore;
