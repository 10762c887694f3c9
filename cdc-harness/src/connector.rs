use async_trait::async_trait;

use crate::engine::EngineConfig;
use crate::error::HarnessResult;
use crate::types::ChangeEvent;

/// The change-data-capture logic bound to one data source.
///
/// The engine drives a connector through three phases:
/// 1. [`Connector::start`] once, with the merged engine configuration.
/// 2. [`Connector::poll`] repeatedly until shutdown is requested. `poll` may be dropped at an
///    await point when shutdown wins the race, so it must be cancel-safe: a cancelled call must
///    not lose changes that a later call would have returned.
/// 3. [`Connector::stop`] once, if `start` succeeded.
#[async_trait]
pub trait Connector: Send {
    async fn start(&mut self, config: &EngineConfig) -> HarnessResult<()>;

    async fn poll(&mut self) -> HarnessResult<Vec<ChangeEvent>>;

    async fn stop(&mut self) -> HarnessResult<()>;
}
