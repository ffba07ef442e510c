//! Realtime direct-message client core.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net` talks to the chat backend (REST and the Socket.IO channel), `state`
//! holds conversations, presence and credentials, and `bridge` is the single
//! place where transport events and UI intents become state changes. Front
//! ends (the `cli` crate) read state through the bridge and dispatch intents;
//! they never mutate the stores directly.

pub mod bridge;
pub mod config;
pub mod net;
pub mod observe;
pub mod state;
pub mod util;
