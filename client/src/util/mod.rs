//! Pure helpers shared by the bridge and its consumers.
//!
//! SYSTEM CONTEXT
//! ==============
//! Read-time projections live here so they stay free of store and transport
//! concerns and can be tested with fixed clocks.

pub mod day_groups;
