//! Client-side sync state.
//!
//! DESIGN
//! ======
//! State is split by domain (`conversations`, `presence`, `auth`) so the
//! bridge and UI surfaces can depend on small focused models. Only
//! [`crate::bridge::SyncBridge`] mutates conversations and presence.

pub mod auth;
pub mod conversations;
pub mod presence;
