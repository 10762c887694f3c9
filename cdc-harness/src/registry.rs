//! Factories for the connectors, resources and callbacks a declaration can name.
//!
//! A [`TestDeclaration`](crate::declaration::TestDeclaration) only carries identifiers; the
//! [`Registry`] maps each identifier to a constructor so the orchestrator can build fresh
//! instances for every scope.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bail;
use crate::callback::ConnectorCallback;
use crate::connector::Connector;
use crate::error::{ErrorKind, HarnessResult};
use crate::resource::Resource;
use crate::types::Identifier;

pub type ConnectorFactory = Arc<dyn Fn() -> HarnessResult<Box<dyn Connector>> + Send + Sync>;

pub type ResourceFactory = Arc<dyn Fn() -> HarnessResult<Box<dyn Resource>> + Send + Sync>;

pub type CallbackFactory =
    Arc<dyn Fn() -> HarnessResult<Arc<dyn ConnectorCallback>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Registry {
    connectors: HashMap<Identifier, ConnectorFactory>,
    resources: HashMap<Identifier, ResourceFactory>,
    callbacks: HashMap<Identifier, CallbackFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a default-constructible connector under `id`.
    pub fn register_connector<C>(self, id: impl Into<Identifier>) -> Self
    where
        C: Connector + Default + 'static,
    {
        self.register_connector_with(id, || Ok(Box::new(C::default())))
    }

    /// Registers a connector constructor under `id`. A later registration replaces an earlier one.
    pub fn register_connector_with<F>(mut self, id: impl Into<Identifier>, factory: F) -> Self
    where
        F: Fn() -> HarnessResult<Box<dyn Connector>> + Send + Sync + 'static,
    {
        self.connectors.insert(id.into(), Arc::new(factory));
        self
    }

    /// Registers a default-constructible resource under `id`.
    pub fn register_resource<R>(self, id: impl Into<Identifier>) -> Self
    where
        R: Resource + Default + 'static,
    {
        self.register_resource_with(id, || Ok(Box::new(R::default())))
    }

    /// Registers a resource constructor under `id`. A later registration replaces an earlier one.
    pub fn register_resource_with<F>(mut self, id: impl Into<Identifier>, factory: F) -> Self
    where
        F: Fn() -> HarnessResult<Box<dyn Resource>> + Send + Sync + 'static,
    {
        self.resources.insert(id.into(), Arc::new(factory));
        self
    }

    /// Registers a default-constructible callback under `id`.
    pub fn register_callback<C>(self, id: impl Into<Identifier>) -> Self
    where
        C: ConnectorCallback + Default + 'static,
    {
        self.register_callback_with(id, || Ok(Arc::new(C::default())))
    }

    /// Registers a callback constructor under `id`. A later registration replaces an earlier one.
    pub fn register_callback_with<F>(mut self, id: impl Into<Identifier>, factory: F) -> Self
    where
        F: Fn() -> HarnessResult<Arc<dyn ConnectorCallback>> + Send + Sync + 'static,
    {
        self.callbacks.insert(id.into(), Arc::new(factory));
        self
    }

    /// Builds a fresh connector registered under `id`.
    pub fn create_connector(&self, id: &str) -> HarnessResult<Box<dyn Connector>> {
        let Some(factory) = self.connectors.get(id) else {
            bail!(
                ErrorKind::UnknownIdentifier,
                "No connector registered under this identifier",
                id
            );
        };

        factory().map_err(|err| {
            crate::harness_error!(
                ErrorKind::ConnectorConstructionFailed,
                "Connector could not be constructed",
                format!("connector '{id}': {err}")
            )
        })
    }

    /// Builds a fresh resource registered under `id`.
    pub fn create_resource(&self, id: &str) -> HarnessResult<Box<dyn Resource>> {
        let Some(factory) = self.resources.get(id) else {
            bail!(
                ErrorKind::UnknownIdentifier,
                "No resource registered under this identifier",
                id
            );
        };

        factory().map_err(|err| {
            crate::harness_error!(
                ErrorKind::ResourceConstructionFailed,
                "Resource could not be constructed",
                format!("resource '{id}': {err}")
            )
        })
    }

    /// Builds a fresh callback registered under `id`.
    pub fn create_callback(&self, id: &str) -> HarnessResult<Arc<dyn ConnectorCallback>> {
        let Some(factory) = self.callbacks.get(id) else {
            bail!(
                ErrorKind::UnknownIdentifier,
                "No callback registered under this identifier",
                id
            );
        };

        factory().map_err(|err| {
            crate::harness_error!(
                ErrorKind::CallbackConstructionFailed,
                "Callback could not be constructed",
                format!("callback '{id}': {err}")
            )
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut connectors = self.connectors.keys().collect::<Vec<_>>();
        let mut resources = self.resources.keys().collect::<Vec<_>>();
        let mut callbacks = self.callbacks.keys().collect::<Vec<_>>();
        connectors.sort();
        resources.sort();
        callbacks.sort();

        f.debug_struct("Registry")
            .field("connectors", &connectors)
            .field("resources", &resources)
            .field("callbacks", &callbacks)
            .finish()
    }
}
