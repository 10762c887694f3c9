use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Base configuration file loaded for all environments.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "HARNESS";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
///
/// Example: `HARNESS_POSTGRES__HOST` sets the `postgres.host` field.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build or deserialize the configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to resolve the configuration environment: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads hierarchical configuration from YAML files and environment variables.
///
/// Loads configuration in this order, later sources overriding earlier ones:
/// 1. Base configuration from `configuration/base.yaml`, if present
/// 2. Environment-specific file from `configuration/{environment}.yaml`, if present
/// 3. Environment variable overrides prefixed with `HARNESS`
///
/// Both files are optional so that a test suite without any configuration directory still
/// loads the defaults of `T`.
pub fn load_config<T>() -> Result<T, LoadError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir()?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    let environment = Environment::load()?;
    let environment_filename = format!("{environment}.yaml");

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = config::Config::builder()
        .add_source(
            config::File::from(configuration_directory.join(BASE_CONFIG_FILE)).required(false),
        )
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        // E.g. `HARNESS_ENGINE_CLOSE_TIMEOUT_MS=10000` sets `engine_close_timeout_ms`.
        .add_source(environment_source)
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
