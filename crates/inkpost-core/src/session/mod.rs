//! Session domain module.
//!
//! - `model`: session state, user profile and token records
//! - `identity`: identity keys scoping remote records

mod identity;
mod model;

pub use identity::{IdentityKey, IdentitySource};
pub use model::{SessionState, TokenInfo, UserProfile};
