//! Configuration System
//!
//! Layered client configuration: merge policy defaults, the global user file,
//! the workspace `graphcache.toml`, then `GRAPHCACHE__*` environment overrides.
//! Function-valued queue settings live on [`crate::link::QueueLinkConfig`].

use crate::logging::LoggingConfig;
use crate::read::PossibleTypes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the sled databases live. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".graphcache/cache")
}

fn default_queue_path() -> PathBuf {
    PathBuf::from(".graphcache/queue")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            queue_path: default_queue_path(),
        }
    }
}

impl StorageConfig {
    /// Absolute cache and queue paths for `workspace_root`.
    pub fn resolve_paths(&self, workspace_root: &Path) -> (PathBuf, PathBuf) {
        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                workspace_root.join(path)
            }
        };
        (resolve(&self.cache_path), resolve(&self.queue_path))
    }
}

/// Read-side settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Omit missing fields instead of failing the read.
    #[serde(default)]
    pub return_partial_data: bool,

    /// Abstract types and the concrete types that satisfy them.
    #[serde(default)]
    pub possible_types: Vec<PossibleTypesEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleTypesEntry {
    pub supertype: String,
    #[serde(default)]
    pub subtypes: Vec<String>,
}

impl CacheSettings {
    pub fn possible_types(&self) -> PossibleTypes {
        self.possible_types
            .iter()
            .fold(PossibleTypes::new(), |types, entry| {
                types.with_subtypes(entry.supertype.clone(), entry.subtypes.iter().cloned())
            })
    }
}

/// Offline queue settings that can come from files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub persist_optimistic_response: bool,

    #[serde(default)]
    pub dequeue_on_error: bool,

    /// Per-entry replay timeout for drains; unset waits indefinitely.
    #[serde(default)]
    pub replay_timeout_ms: Option<u64>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Storage(String),
    Cache(String),
    Queue(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Queue(msg) => write!(f, "Queue: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ClientConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.cache_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Cache path cannot be empty".to_string(),
            ));
        }
        if self.storage.queue_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Queue path cannot be empty".to_string(),
            ));
        }

        for entry in &self.cache.possible_types {
            if entry.subtypes.iter().any(|s| s == &entry.supertype) {
                errors.push(ValidationError::Cache(format!(
                    "Type '{}' lists itself as a possible type",
                    entry.supertype
                )));
            }
        }

        if self.queue.replay_timeout_ms == Some(0) {
            errors.push(ValidationError::Queue(
                "replay_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
