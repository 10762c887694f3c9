//! Configuration management for the CDC test harness.
//!
//! Provides environment detection, configuration loading from optional YAML files and
//! environment variables, secret handling, and the shared configuration types consumed by
//! the orchestrator and the bundled resource managers.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
