//! Setup and teardown choreography around a declared connector.
//!
//! The [`Orchestrator`] turns a [`TestDeclaration`] into a running [`TestScope`]:
//! 1. Instantiates every declared resource through the [`Registry`], failing fast.
//! 2. Starts the resources in declaration order and collects their configuration.
//! 3. Merges overrides, resource values and engine defaults into an [`EngineConfig`].
//! 4. Builds the connector, the optional user callback and the [`EngineHandle`], then runs it.
//!
//! [`TestScope::teardown`] reverses this: it closes the engine with a bounded wait and then
//! stops every resource, reporting but never propagating failures.

use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use cdc_harness_config::shared::HarnessConfig;

use crate::declaration::TestDeclaration;
use crate::engine::{CloseOutcome, EngineConfig, EngineHandle};
use crate::error::{HarnessError, HarnessResult};
use crate::registry::Registry;
use crate::resource::ResourceSet;
use crate::types::Identifier;

/// Reason reported for tests of a suite that declares no connector.
pub const NO_CONNECTOR_DECLARED: &str = "no connector declared";

/// Whether the tests of a suite should run at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionCondition {
    Enabled,
    Disabled(String),
}

impl ExecutionCondition {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ExecutionCondition::Enabled)
    }
}

/// Drives setup and teardown of test scopes for one registry and harness configuration.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Registry,
    config: HarnessConfig,
}

impl Orchestrator {
    /// Creates an orchestrator after validating `config`.
    pub fn new(registry: Registry, config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;

        Ok(Self { registry, config })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Enables the tests of a suite only when it declares a connector.
    pub fn evaluate(declaration: Option<&TestDeclaration>) -> ExecutionCondition {
        match declaration {
            Some(_) => ExecutionCondition::Enabled,
            None => ExecutionCondition::Disabled(NO_CONNECTOR_DECLARED.to_owned()),
        }
    }

    /// Starts the resources and the engine described by `declaration`.
    ///
    /// Returns `Ok(None)` without doing anything when there is no declaration. The returned
    /// scope's engine has been run but may still be starting; use
    /// [`TestScope::resolve_engine`] to wait for it. On error every resource that was started
    /// has already been stopped.
    pub async fn setup(
        &self,
        declaration: Option<&TestDeclaration>,
    ) -> HarnessResult<Option<TestScope>> {
        let Some(declaration) = declaration else {
            info!("no connector declared, skipping setup");

            return Ok(None);
        };

        info!(
            "setting up connector '{}' with {} resources",
            declaration.connector(),
            declaration.resources().len()
        );

        let mut resources = self.instantiate_resources(declaration)?;
        let resource_values = resources.start_all().await?;

        let config = EngineConfig::merge(
            declaration.connector(),
            resource_values,
            declaration.overrides(),
        );

        let engine = match self.build_engine(declaration, config).await {
            Ok(engine) => engine,
            Err(err) => {
                warn!(
                    "failed to build engine for connector '{}': {}",
                    declaration.connector(),
                    err
                );
                resources.stop_all().await;

                return Err(err);
            }
        };

        Ok(Some(TestScope {
            engine,
            resources,
            start_timeout: self.config.engine_start_timeout(),
            close_timeout: self.config.engine_close_timeout(),
        }))
    }

    fn instantiate_resources(&self, declaration: &TestDeclaration) -> HarnessResult<ResourceSet> {
        let mut resources = Vec::with_capacity(declaration.resources().len());
        for id in declaration.resources() {
            let resource = self.registry.create_resource(id)?;
            resources.push((id.clone(), resource));
        }

        Ok(ResourceSet::new(resources))
    }

    async fn build_engine(
        &self,
        declaration: &TestDeclaration,
        config: EngineConfig,
    ) -> HarnessResult<EngineHandle> {
        let connector = self.registry.create_connector(declaration.connector())?;
        let user_callback = declaration
            .callback()
            .map(|id| self.registry.create_callback(id))
            .transpose()?;

        let engine = EngineHandle::new(declaration.connector(), connector, config, user_callback)?;
        engine.run().await?;

        Ok(engine)
    }
}

/// Resources and engine owned by one scope, a whole suite or a single test.
pub struct TestScope {
    engine: EngineHandle,
    resources: ResourceSet,
    start_timeout: Duration,
    close_timeout: Duration,
}

impl TestScope {
    /// Returns the engine without waiting for it to run.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Returns the engine once it reports running, waiting at most the start timeout.
    pub async fn resolve_engine(&self) -> HarnessResult<EngineHandle> {
        self.engine.wait_until_running(self.start_timeout).await?;

        Ok(self.engine.clone())
    }

    /// Closes the engine and then stops every resource in declaration order.
    ///
    /// Never fails: a forced engine termination and resource stop failures are logged and
    /// reported in the returned summary.
    pub async fn teardown(mut self) -> TeardownSummary {
        info!(
            "tearing down connector '{}'",
            self.engine.connector_id()
        );

        let engine = self.engine.close(self.close_timeout).await;
        if engine == CloseOutcome::Forced {
            warn!(
                "engine for connector '{}' was forcibly terminated",
                self.engine.connector_id()
            );
        }

        let failed_resources = self.resources.stop_all().await;
        if !failed_resources.is_empty() {
            warn!(
                "{} resources failed to stop for connector '{}'",
                failed_resources.len(),
                self.engine.connector_id()
            );
        }

        TeardownSummary {
            engine,
            failed_resources,
        }
    }
}

impl fmt::Debug for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScope")
            .field("engine", &self.engine)
            .field("resources", &self.resources)
            .field("start_timeout", &self.start_timeout)
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

/// What happened during [`TestScope::teardown`].
#[derive(Debug)]
pub struct TeardownSummary {
    pub engine: CloseOutcome,
    pub failed_resources: Vec<(Identifier, HarnessError)>,
}

impl TeardownSummary {
    /// Returns `true` when the engine stopped gracefully and every resource stopped.
    pub fn is_clean(&self) -> bool {
        self.engine == CloseOutcome::Graceful && self.failed_resources.is_empty()
    }
}
