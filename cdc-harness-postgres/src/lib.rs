//! Postgres resource manager for the CDC test harness.
//!
//! [`PostgresResource`] creates a throwaway database on a running Postgres server for every
//! scope and drops it, along with its replication slots, on teardown.

mod resource;
pub mod test_utils;

pub use resource::*;
