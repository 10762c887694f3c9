//! Signalling primitives shared between the orchestrator and the engine task.

pub mod shutdown;
pub mod signal;
