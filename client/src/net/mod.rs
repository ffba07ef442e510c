//! Networking modules for the chat backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls, `transport` manages the realtime socket
//! lifecycle, `events` names and decodes what travels over it, and `types`
//! defines the shared wire schema. `image` turns local files into the data
//! URIs the backend accepts as attachments.

pub mod api;
pub mod events;
pub mod image;
pub mod transport;
pub mod types;
