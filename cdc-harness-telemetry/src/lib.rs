//! Tracing setup for test suites and tools built on the CDC test harness.

mod tracing;

pub use crate::tracing::*;
