//! External dependencies started for the duration of a test scope.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::harness_error;
use crate::types::Identifier;

/// Lifecycle contract of an external test dependency, e.g. a database or a broker.
///
/// [`Resource::start`] returns configuration fragments (hostnames, ports, credentials) that are
/// merged into the engine configuration. [`Resource::stop`] must be safe to call even when
/// `start` failed halfway through.
#[async_trait]
pub trait Resource: Send {
    async fn start(&mut self) -> HarnessResult<HashMap<String, String>>;

    async fn stop(&mut self) -> HarnessResult<()>;
}

/// Ordered set of resource instances belonging to one scope.
pub struct ResourceSet {
    resources: Vec<(Identifier, Box<dyn Resource>)>,
    /// Number of resources, counted from the front, on which `start` has been attempted.
    started: usize,
}

impl ResourceSet {
    pub fn new(resources: Vec<(Identifier, Box<dyn Resource>)>) -> Self {
        Self {
            resources,
            started: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Starts every resource in declaration order and merges the returned fragments.
    ///
    /// If two resources return the same key, the later one wins. If a resource fails to start,
    /// every resource attempted so far (the failing one included) is stopped before the start
    /// error is returned.
    pub async fn start_all(&mut self) -> HarnessResult<HashMap<String, String>> {
        let mut configuration = HashMap::new();

        for index in self.started..self.resources.len() {
            let (id, resource) = &mut self.resources[index];
            self.started = index + 1;

            info!("starting resource '{}'", id);

            match resource.start().await {
                Ok(fragment) => configuration.extend(fragment),
                Err(err) => {
                    warn!("resource '{}' failed to start: {}", id, err);
                    let err = harness_error!(
                        ErrorKind::ResourceStartFailed,
                        "Resource failed to start",
                        format!("resource '{id}': {err}")
                    );
                    self.stop_all().await;

                    return Err(err);
                }
            }
        }

        Ok(configuration)
    }

    /// Stops every resource on which `start` was attempted, in declaration order.
    ///
    /// A failing resource does not prevent the next one from being stopped. Failures are
    /// logged and returned, never propagated as an error.
    pub async fn stop_all(&mut self) -> Vec<(Identifier, HarnessError)> {
        let mut failures = Vec::new();

        for (id, resource) in self.resources.iter_mut().take(self.started) {
            info!("stopping resource '{}'", id);

            if let Err(err) = resource.stop().await {
                warn!("resource '{}' failed to stop: {}", id, err);
                failures.push((
                    id.clone(),
                    harness_error!(
                        ErrorKind::ResourceStopFailed,
                        "Resource failed to stop",
                        format!("resource '{id}': {err}")
                    ),
                ));
            }
        }

        self.started = 0;

        failures
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field(
                "resources",
                &self.resources.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("started", &self.started)
            .finish()
    }
}
