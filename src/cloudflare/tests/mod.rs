//! The measurement phases and the engine that sequences them.

pub mod engine;
