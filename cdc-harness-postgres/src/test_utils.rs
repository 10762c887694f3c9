use cdc_harness::error::{ErrorKind, HarnessError, HarnessResult};
use cdc_harness::harness_error;
use cdc_harness_config::shared::{IntoConnectOptions, PgConnectionConfig};
use tokio_postgres::{Client, NoTls};
use tracing::info;

fn database_error(description: &'static str, err: tokio_postgres::Error) -> HarnessError {
    harness_error!(ErrorKind::DatabaseError, description, err)
}

async fn connect(config: tokio_postgres::Config) -> HarnessResult<Client> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|err| database_error("Failed to connect to Postgres", err))?;

    // Spawn the connection on a new task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            info!("connection error: {e}");
        }
    });

    Ok(client)
}

/// Creates the database named in `config` and returns a client connected to it.
///
/// The server is reached through its maintenance database, so `config.name` must not exist
/// yet.
pub async fn create_pg_database(config: &PgConnectionConfig) -> HarnessResult<Client> {
    let client = connect(config.without_db()).await?;

    client
        .execute(&*format!(r#"create database "{}";"#, config.name), &[])
        .await
        .map_err(|err| database_error("Failed to create database", err))?;

    info!("created test database '{}'", config.name);

    connect_to_pg_database(config).await
}

/// Connects to the existing database named in `config`.
pub async fn connect_to_pg_database(config: &PgConnectionConfig) -> HarnessResult<Client> {
    connect(config.with_db()).await
}

/// Drops the database named in `config`.
///
/// Terminates all other connections to it and drops its replication slots first, since
/// either would make `drop database` fail.
pub async fn drop_pg_database(config: &PgConnectionConfig) -> HarnessResult<()> {
    let client = connect(config.without_db()).await?;

    // Forcefully terminate any remaining connections to the database
    client
        .execute(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = $1
            and pid <> pg_backend_pid();"#,
            &[&config.name],
        )
        .await
        .map_err(|err| database_error("Failed to terminate database connections", err))?;

    // Drop any replication slots on this database
    client
        .execute(
            r#"
            select pg_drop_replication_slot(slot_name)
            from pg_replication_slots
            where database = $1;"#,
            &[&config.name],
        )
        .await
        .map_err(|err| database_error("Failed to drop test replication slots", err))?;

    client
        .execute(
            &*format!(r#"drop database if exists "{}";"#, config.name),
            &[],
        )
        .await
        .map_err(|err| database_error("Failed to destroy database", err))?;

    info!("dropped test database '{}'", config.name);

    Ok(())
}
