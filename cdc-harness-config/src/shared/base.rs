use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The bounded wait for the engine to report running cannot be zero.
    #[error("`engine_start_timeout_ms` cannot be zero")]
    EngineStartTimeoutZero,
    /// The bounded wait for the engine to shut down cannot be zero.
    #[error("`engine_close_timeout_ms` cannot be zero")]
    EngineCloseTimeoutZero,
    /// A Postgres connection needs a host to connect to.
    #[error("`postgres.host` cannot be empty")]
    MissingPostgresHost,
}
