//! Shared identifiers and reserved names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved field carrying a record's concrete type name.
pub const TYPENAME_FIELD: &str = "__typename";

/// Reserved field marking a value as a reference to a normalized record.
pub const REF_FIELD: &str = "__ref";

pub const ROOT_QUERY: &str = "ROOT_QUERY";
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";
pub const ROOT_SUBSCRIPTION: &str = "ROOT_SUBSCRIPTION";

/// Identifies one logical operation across its queue/replay lifecycle.
///
/// Callers supply the id; it must stay stable across retries so a replayed
/// mutation can be matched to its queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        RequestId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId(id)
    }
}

/// Where an observed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Network,
    Cache,
    Optimistic,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Network => "network",
            DataSource::Cache => "cache",
            DataSource::Optimistic => "optimistic",
        }
    }
}
