use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use cdc_harness::error::HarnessResult;
use cdc_harness::resource::Resource;
use cdc_harness_config::load_config;
use cdc_harness_config::shared::{HarnessConfig, PgConnectionConfig};

use crate::test_utils::{create_pg_database, drop_pg_database};

pub const DATABASE_HOSTNAME_KEY: &str = "database.hostname";
pub const DATABASE_PORT_KEY: &str = "database.port";
pub const DATABASE_USER_KEY: &str = "database.user";
pub const DATABASE_PASSWORD_KEY: &str = "database.password";
pub const DATABASE_DBNAME_KEY: &str = "database.dbname";

/// Provides a fresh Postgres database per scope.
///
/// [`Resource::start`] creates a database with a random name on the configured server and
/// returns its coordinates under the `database.*` keys. [`Resource::stop`] drops it again.
#[derive(Debug)]
pub struct PostgresResource {
    server: PgConnectionConfig,
    database: Option<PgConnectionConfig>,
}

impl PostgresResource {
    /// Creates a resource that provisions databases on `server`.
    pub fn new(server: PgConnectionConfig) -> Self {
        Self {
            server,
            database: None,
        }
    }

    /// Connection configuration of the database created by `start`, if any.
    pub fn database(&self) -> Option<&PgConnectionConfig> {
        self.database.as_ref()
    }
}

impl Default for PostgresResource {
    /// Uses the `postgres` section of the loaded [`HarnessConfig`], falling back to the
    /// defaults when no configuration can be loaded.
    fn default() -> Self {
        let server = match load_config::<HarnessConfig>() {
            Ok(config) => config.postgres,
            Err(err) => {
                warn!("failed to load harness configuration, using defaults: {}", err);
                PgConnectionConfig::default()
            }
        };

        Self::new(server)
    }
}

#[async_trait]
impl Resource for PostgresResource {
    async fn start(&mut self) -> HarnessResult<HashMap<String, String>> {
        let database = self.server.for_database(Uuid::new_v4().to_string());

        // Recorded first so that `stop` cleans up after a partially failed create.
        self.database = Some(database.clone());
        create_pg_database(&database).await?;

        info!(
            "postgres resource started database '{}' on {}:{}",
            database.name, database.host, database.port
        );

        let mut values = HashMap::from([
            (DATABASE_HOSTNAME_KEY.to_owned(), database.host.clone()),
            (DATABASE_PORT_KEY.to_owned(), database.port.to_string()),
            (DATABASE_USER_KEY.to_owned(), database.username.clone()),
            (DATABASE_DBNAME_KEY.to_owned(), database.name.clone()),
        ]);

        if let Some(password) = &database.password {
            values.insert(
                DATABASE_PASSWORD_KEY.to_owned(),
                password.expose_secret().to_owned(),
            );
        }

        Ok(values)
    }

    async fn stop(&mut self) -> HarnessResult<()> {
        let Some(database) = self.database.take() else {
            return Ok(());
        };

        drop_pg_database(&database).await
    }
}
