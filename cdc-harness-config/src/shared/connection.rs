use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio_postgres::Config as TokioPgConnectOptions;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Default port of the local Postgres instance used by the test suites.
const DEFAULT_PG_PORT: u16 = 5430;

/// Configuration for connecting to a Postgres server.
///
/// `name` is the maintenance database used for administrative statements; resource managers
/// create their own databases next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

impl PgConnectionConfig {
    /// Validates the [`PgConnectionConfig`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingPostgresHost);
        }

        Ok(())
    }

    /// Returns a copy of this configuration pointing at the database `name`.
    pub fn for_database(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl Default for PgConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PG_PORT,
            name: "postgres".to_owned(),
            username: "postgres".to_owned(),
            password: Some("postgres".to_owned().into()),
        }
    }
}

/// A trait which can be used to convert the implementation into crate specific connect
/// options.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for connecting to the Postgres server without specifying a
    /// database. Useful for administrative operations like database creation.
    fn without_db(&self) -> Output;

    /// Creates connection options for connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone());

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }

    fn with_db(&self) -> TokioPgConnectOptions {
        let mut options: TokioPgConnectOptions = self.without_db();
        options.dbname(self.name.clone());
        options
    }
}
