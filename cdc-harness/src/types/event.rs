use serde::{Deserialize, Serialize};

/// A change captured by a connector.
///
/// `partition` and `position` locate the change in the source, e.g. a replication slot and an
/// LSN. The engine commits the highest position seen per partition as the connector offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Destination topic, usually `<topic.prefix>.<schema>.<table>`.
    pub topic: String,
    /// Optional record key.
    pub key: Option<String>,
    /// Record payload.
    pub value: serde_json::Value,
    /// Source partition the change was read from.
    pub partition: String,
    /// Position of the change inside its partition.
    pub position: u64,
}

impl ChangeEvent {
    pub fn new(
        topic: impl Into<String>,
        value: serde_json::Value,
        partition: impl Into<String>,
        position: u64,
    ) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value,
            partition: partition.into(),
            position,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
