//! Application layer for Inkpost.
//!
//! This crate provides the state stores that coordinate between the domain
//! model and the infrastructure collaborators: the session and preferences
//! stores, the sync plumbing they share, and the registry that hands out
//! store instances.

pub mod bootstrap;
pub mod context;
pub mod preferences;
pub mod registry;
pub mod session;
pub mod state;
pub mod sync;

pub use bootstrap::AppBootstrap;
pub use context::StoreContext;
pub use preferences::PreferencesStore;
pub use registry::StoreRegistry;
pub use session::SessionStore;
pub use sync::{ConnectivityState, SyncHandle};
