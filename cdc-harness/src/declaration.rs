//! Declarative description of what a test suite needs.

use crate::types::Identifier;

/// Immutable per-suite descriptor read by the orchestrator.
///
/// Carries the connector under test, the resources to start before it, the static
/// configuration overrides and an optional user callback. Build one with
/// [`TestDeclaration::builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDeclaration {
    connector: Identifier,
    resources: Vec<Identifier>,
    overrides: Vec<(String, String)>,
    callback: Option<Identifier>,
}

impl TestDeclaration {
    /// Starts a declaration for the connector registered under `connector`.
    pub fn builder(connector: impl Into<Identifier>) -> TestDeclarationBuilder {
        TestDeclarationBuilder {
            declaration: TestDeclaration {
                connector: connector.into(),
                resources: Vec::new(),
                overrides: Vec::new(),
                callback: None,
            },
        }
    }

    pub fn connector(&self) -> &str {
        &self.connector
    }

    /// Resource identifiers in declaration order.
    pub fn resources(&self) -> &[Identifier] {
        &self.resources
    }

    /// Static configuration overrides in declaration order.
    pub fn overrides(&self) -> &[(String, String)] {
        &self.overrides
    }

    pub fn callback(&self) -> Option<&str> {
        self.callback.as_deref()
    }
}

/// Builder for [`TestDeclaration`].
#[derive(Debug, Clone)]
pub struct TestDeclarationBuilder {
    declaration: TestDeclaration,
}

impl TestDeclarationBuilder {
    /// Appends a resource. Resources start in the order they are added.
    pub fn resource(mut self, resource: impl Into<Identifier>) -> Self {
        self.declaration.resources.push(resource.into());
        self
    }

    /// Appends a static configuration override.
    ///
    /// When the same key is declared twice the later value wins.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.declaration
            .overrides
            .push((key.into(), value.into()));
        self
    }

    /// Sets the user callback composed after the built-in state tracker.
    pub fn callback(mut self, callback: impl Into<Identifier>) -> Self {
        self.declaration.callback = Some(callback.into());
        self
    }

    pub fn build(self) -> TestDeclaration {
        self.declaration
    }
}
