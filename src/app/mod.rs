// Companion - app/mod.rs
//
// Application layer: the polling loop, log sources, view state, and
// preferences persistence.
// Dependencies: core layer, platform config.

pub mod poller;
pub mod session;
pub mod source;
pub mod state;
