// Companion - lib.rs
//
// Library entry point, exposing every module for integration testing.
// The console front-end lives in `main.rs`.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
