//! Preferences store.

mod store;

pub use store::PreferencesStore;
