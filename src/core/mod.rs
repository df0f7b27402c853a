// Companion - core/mod.rs
//
// Core business logic layer.
// Dependencies: serde, serde_json, chrono, regex, csv, tracing, and
// util (constants, errors, logging::preview); no filesystem or threads.
// Must NOT depend on: platform or app.

pub mod export;
pub mod filter;
pub mod highlight;
pub mod model;
pub mod parser;
pub mod tail_buffer;
pub mod timestamp;
