use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::bail;
use crate::error::{ErrorKind, HarnessResult};

/// Logical name of the connector instance.
pub const NAME_KEY: &str = "name";
/// Prefix of every topic the connector emits to.
pub const TOPIC_PREFIX_KEY: &str = "topic.prefix";
/// Interval in milliseconds between two offset flushes.
pub const OFFSET_FLUSH_INTERVAL_MS_KEY: &str = "offset.flush.interval.ms";
/// Pause in milliseconds after a poll that returned no events.
pub const POLL_INTERVAL_MS_KEY: &str = "poll.interval.ms";
/// Offset store used by the engine.
pub const OFFSET_STORAGE_KEY: &str = "offset.storage";
/// Identifier of the connector bound to the engine. Always set from the declaration.
pub const CONNECTOR_CLASS_KEY: &str = "connector.class";

/// The only offset store the engine supports.
pub const MEMORY_OFFSET_STORAGE: &str = "memory";

/// Returns a fresh copy of the built-in engine defaults.
///
/// Every entry can be overridden by a resource or by a static override.
pub fn default_configuration() -> BTreeMap<String, String> {
    BTreeMap::from([
        (NAME_KEY.to_owned(), "testing-connector".to_owned()),
        (TOPIC_PREFIX_KEY.to_owned(), "testing".to_owned()),
        (OFFSET_FLUSH_INTERVAL_MS_KEY.to_owned(), "100".to_owned()),
        (POLL_INTERVAL_MS_KEY.to_owned(), "50".to_owned()),
        (
            OFFSET_STORAGE_KEY.to_owned(),
            MEMORY_OFFSET_STORAGE.to_owned(),
        ),
    ])
}

/// Merged, immutable configuration handed to the engine and its connector.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    values: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Merges the three configuration layers for `connector`.
    ///
    /// Static overrides beat resource values, which beat the defaults. Within the overrides
    /// the last occurrence of a key wins. `connector.class` is written last and always equals
    /// `connector`.
    pub fn merge(
        connector: &str,
        resource_values: HashMap<String, String>,
        overrides: &[(String, String)],
    ) -> Self {
        let mut values = default_configuration();
        values.extend(resource_values);
        values.extend(overrides.iter().cloned());
        values.insert(CONNECTOR_CLASS_KEY.to_owned(), connector.to_owned());

        Self { values }
    }

    /// Returns the value configured for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Identifier of the connector the configuration was merged for.
    pub fn connector(&self) -> &str {
        self.get(CONNECTOR_CLASS_KEY).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses `offset.flush.interval.ms` into a positive duration.
    pub fn offset_flush_interval(&self) -> HarnessResult<Duration> {
        self.positive_millis(OFFSET_FLUSH_INTERVAL_MS_KEY)
    }

    /// Parses `poll.interval.ms` into a positive duration.
    pub fn poll_interval(&self) -> HarnessResult<Duration> {
        self.positive_millis(POLL_INTERVAL_MS_KEY)
    }

    fn positive_millis(&self, key: &str) -> HarnessResult<Duration> {
        let Some(raw) = self.get(key) else {
            bail!(
                ErrorKind::ConfigError,
                "Missing engine configuration value",
                key
            );
        };

        let millis = raw.trim().parse::<u64>().map_err(|err| {
            crate::harness_error!(
                ErrorKind::ConfigError,
                "Engine interval is not a valid integer",
                format!("{key}={raw}: {err}")
            )
        })?;

        if millis == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Engine interval must be positive",
                format!("{key}={raw}")
            );
        }

        Ok(Duration::from_millis(millis))
    }

    /// Checks that the engine keys select supported behavior.
    pub fn validate(&self) -> HarnessResult<()> {
        self.offset_flush_interval()?;
        self.poll_interval()?;

        match self.get(OFFSET_STORAGE_KEY) {
            Some(MEMORY_OFFSET_STORAGE) => {}
            Some(other) => bail!(
                ErrorKind::ConfigError,
                "Unsupported offset storage",
                format!("{OFFSET_STORAGE_KEY}={other}")
            ),
            None => bail!(
                ErrorKind::ConfigError,
                "Missing engine configuration value",
                OFFSET_STORAGE_KEY
            ),
        }

        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Resource fragments routinely carry credentials.
        f.debug_map()
            .entries(self.values.iter().map(|(k, v)| {
                if k.contains("password") {
                    (k.as_str(), "REDACTED")
                } else {
                    (k.as_str(), v.as_str())
                }
            }))
            .finish()
    }
}
