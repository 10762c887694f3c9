//! Minimal suite runner that applies the orchestrator lifecycle to a list of async tests.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tracing::{Instrument, error, info, warn};

use cdc_harness_config::shared::{HarnessConfig, Lifecycle};

use crate::callback::panic_message;
use crate::declaration::TestDeclaration;
use crate::engine::EngineHandle;
use crate::error::{ErrorKind, HarnessError, HarnessResult};
use crate::harness_error;
use crate::orchestrator::{ExecutionCondition, Orchestrator, TestScope};
use crate::registry::Registry;

type TestBody = Box<dyn Fn(EngineHandle) -> BoxFuture<'static, HarnessResult<()>> + Send + Sync>;

/// Result of a single test.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed,
    Failed(HarnessError),
    Skipped(String),
}

/// Outcome of one named test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub outcome: TestOutcome,
}

/// Outcomes of every test of a suite, in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub suite: String,
    pub tests: Vec<TestReport>,
}

impl SuiteReport {
    /// Returns the outcome of the test named `name`.
    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.tests
            .iter()
            .find(|test| test.name == name)
            .map(|test| &test.outcome)
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TestOutcome::Skipped(_)))
    }

    /// Returns `true` when no test failed. Skipped tests do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Panics with the list of failed tests unless the suite succeeded.
    pub fn assert_success(&self) {
        if self.is_success() {
            return;
        }

        let failures = self
            .tests
            .iter()
            .filter_map(|test| match &test.outcome {
                TestOutcome::Failed(err) => Some(format!("  {}: {}", test.name, err)),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        panic!(
            "suite '{}' had {} failed tests:\n{}",
            self.suite,
            self.failed(),
            failures
        );
    }

    fn count(&self, predicate: impl Fn(&TestOutcome) -> bool) -> usize {
        self.tests
            .iter()
            .filter(|test| predicate(&test.outcome))
            .count()
    }
}

/// A named list of async tests sharing one [`TestDeclaration`].
///
/// ```ignore
/// let report = TestSuite::new("postgres_connector", registry)
///     .declare(TestDeclaration::builder("postgres").resource("database").build())
///     .test("emits_inserts", |engine| async move {
///         engine.wait_for_n_events(1).await.notified().await;
///         Ok(())
///     })
///     .run()
///     .await?;
///
/// report.assert_success();
/// ```
pub struct TestSuite {
    name: String,
    registry: Registry,
    declaration: Option<TestDeclaration>,
    config: HarnessConfig,
    tests: Vec<(String, TestBody)>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, registry: Registry) -> Self {
        Self {
            name: name.into(),
            registry,
            declaration: None,
            config: HarnessConfig::default(),
            tests: Vec::new(),
        }
    }

    /// Declares the connector, resources and overrides the suite runs against.
    ///
    /// Without a declaration every test is skipped.
    pub fn declare(mut self, declaration: TestDeclaration) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a test. Tests run sequentially in the order they are added.
    pub fn test<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(EngineHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        self.tests
            .push((name.into(), Box::new(move |engine| body(engine).boxed())));
        self
    }

    /// Runs every test under the configured lifecycle.
    ///
    /// Fails only when setting up a scope fails, in which case no further test runs. Every
    /// log line emitted meanwhile carries the suite name in a `suite` span.
    pub async fn run(self) -> HarnessResult<SuiteReport> {
        let suite_span = tracing::info_span!("suite", suite = %self.name);
        self.run_tests().instrument(suite_span).await
    }

    async fn run_tests(self) -> HarnessResult<SuiteReport> {
        let lifecycle = self.config.lifecycle;
        let orchestrator = Orchestrator::new(self.registry, self.config)?;
        let mut report = SuiteReport {
            suite: self.name,
            tests: Vec::with_capacity(self.tests.len()),
        };

        let declaration = match Orchestrator::evaluate(self.declaration.as_ref()) {
            ExecutionCondition::Enabled => self.declaration.as_ref(),
            ExecutionCondition::Disabled(reason) => {
                info!("suite '{}' is disabled: {}", report.suite, reason);
                report.tests = skip_all(self.tests, &reason);

                return Ok(report);
            }
        };

        info!(
            "running suite '{}' with {} tests ({:?})",
            report.suite,
            self.tests.len(),
            lifecycle
        );

        match lifecycle {
            Lifecycle::PerSuite => {
                let Some(scope) = orchestrator.setup(declaration).await? else {
                    report.tests = skip_all(self.tests, NO_SCOPE);
                    return Ok(report);
                };

                for (name, body) in &self.tests {
                    let outcome = run_test(&scope, name, body).await;
                    report.tests.push(TestReport {
                        name: name.clone(),
                        outcome,
                    });
                }

                teardown(scope).await;
            }
            Lifecycle::PerTest => {
                for (name, body) in &self.tests {
                    let Some(scope) = orchestrator.setup(declaration).await? else {
                        report.tests.push(TestReport {
                            name: name.clone(),
                            outcome: TestOutcome::Skipped(NO_SCOPE.to_owned()),
                        });
                        continue;
                    };

                    let outcome = run_test(&scope, name, body).await;
                    teardown(scope).await;

                    report.tests.push(TestReport {
                        name: name.clone(),
                        outcome,
                    });
                }
            }
        }

        info!(
            "suite '{}' finished: {} passed, {} failed, {} skipped",
            report.suite,
            report.passed(),
            report.failed(),
            report.skipped()
        );

        Ok(report)
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("declaration", &self.declaration)
            .field("config", &self.config)
            .field(
                "tests",
                &self.tests.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

const NO_SCOPE: &str = "setup produced no scope";

fn skip_all(tests: Vec<(String, TestBody)>, reason: &str) -> Vec<TestReport> {
    tests
        .into_iter()
        .map(|(name, _)| TestReport {
            name,
            outcome: TestOutcome::Skipped(reason.to_owned()),
        })
        .collect()
}

async fn run_test(scope: &TestScope, name: &str, body: &TestBody) -> TestOutcome {
    let engine = match scope.resolve_engine().await {
        Ok(engine) => engine,
        Err(err) => {
            error!("test '{}' could not resolve the engine: {}", name, err);
            return TestOutcome::Failed(err);
        }
    };

    info!("running test '{}'", name);

    // A spawned task contains panics raised by the body.
    let outcome = match tokio::spawn(body(engine)).await {
        Ok(Ok(())) => TestOutcome::Passed,
        Ok(Err(err)) => TestOutcome::Failed(harness_error!(
            ErrorKind::TestFailed,
            "Test body returned an error",
            err
        )),
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            TestOutcome::Failed(harness_error!(
                ErrorKind::TestPanic,
                "Test body panicked",
                panic_message(payload.as_ref())
            ))
        }
        Err(err) => TestOutcome::Failed(harness_error!(
            ErrorKind::TestFailed,
            "Test body was cancelled",
            err
        )),
    };

    match &outcome {
        TestOutcome::Failed(err) => error!("test '{}' failed: {}", name, err),
        _ => info!("test '{}' passed", name),
    }

    outcome
}

async fn teardown(scope: TestScope) {
    let summary = scope.teardown().await;
    if !summary.is_clean() {
        warn!(
            "teardown was not clean: engine {:?}, {} resources failed to stop",
            summary.engine,
            summary.failed_resources.len()
        );
    }
}
