// Companion - platform/mod.rs
//
// Platform abstraction layer.
// Dependencies: standard library, directories, serde, toml, tracing, and
// core types used in config (CapacityPolicy).
// Must NOT depend on: app.

pub mod config;
pub mod fs;
