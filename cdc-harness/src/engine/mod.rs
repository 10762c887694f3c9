//! Embedded engine that runs a connector on a background task.

mod config;
mod events;
mod handle;
mod offsets;
mod runner;
mod state;

pub use config::*;
pub use events::EventLog;
pub use handle::{CloseOutcome, EngineHandle};
pub use offsets::MemoryOffsetStore;
pub use state::{EngineState, EngineStateTracker};
