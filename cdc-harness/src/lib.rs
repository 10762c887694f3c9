//! Integration-test harness for change-data-capture source connectors.
//!
//! A suite declares which connector it exercises, which external resources it needs and which
//! configuration it overrides. The [`orchestrator::Orchestrator`] starts the resources, merges
//! their configuration with the overrides and the engine defaults, runs the connector inside an
//! [`engine::EngineHandle`] on a background task and hands that handle to the tests. Teardown
//! closes the engine with a bounded wait and stops every resource.

pub mod callback;
pub mod concurrency;
pub mod connector;
pub mod declaration;
pub mod engine;
pub mod error;
mod macros;
pub mod orchestrator;
pub mod registry;
pub mod resource;
pub mod suite;
pub mod types;
