//! Tracing/logging initialization for processes embedding the engine.

pub mod tracing_init;

pub use tracing_init::{init, init_compact};
