use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Default bound, in milliseconds, on the wait for the engine to report running.
pub const DEFAULT_ENGINE_START_TIMEOUT_MS: u64 = 5_000;

/// Default bound, in milliseconds, on the wait for the engine to shut down.
pub const DEFAULT_ENGINE_CLOSE_TIMEOUT_MS: u64 = 5_000;

/// Granularity of the setup/teardown choreography.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Resources and engine are started once and shared by every test of a suite.
    #[default]
    PerSuite,
    /// Resources and engine are started and torn down around each test.
    PerTest,
}

/// Configuration of the test harness itself.
///
/// Every field has a default, so an empty configuration source yields a usable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HarnessConfig {
    /// Bound on the wait for the engine to report running before a test receives it.
    pub engine_start_timeout_ms: u64,
    /// Bound on the wait for the engine to stop before its task is forcibly terminated.
    pub engine_close_timeout_ms: u64,
    /// Whether setup and teardown happen once per suite or once per test.
    pub lifecycle: Lifecycle,
    /// Server used by the Postgres resource manager.
    pub postgres: PgConnectionConfig,
}

impl HarnessConfig {
    /// Validates the harness configuration.
    ///
    /// Both bounds must be non-zero, which keeps every wait in the harness finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.engine_start_timeout_ms == 0 {
            return Err(ValidationError::EngineStartTimeoutZero);
        }

        if self.engine_close_timeout_ms == 0 {
            return Err(ValidationError::EngineCloseTimeoutZero);
        }

        self.postgres.validate()
    }

    /// Returns the start bound as a [`Duration`].
    pub fn engine_start_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_start_timeout_ms)
    }

    /// Returns the close bound as a [`Duration`].
    pub fn engine_close_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_close_timeout_ms)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            engine_start_timeout_ms: DEFAULT_ENGINE_START_TIMEOUT_MS,
            engine_close_timeout_ms: DEFAULT_ENGINE_CLOSE_TIMEOUT_MS,
            lifecycle: Lifecycle::default(),
            postgres: PgConnectionConfig::default(),
        }
    }
}
