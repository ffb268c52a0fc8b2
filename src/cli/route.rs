//! CLI route: single route table and run context.

use crate::cache::SledCacheStore;
use crate::cli::parse::{CacheCommands, Commands, ConfigCommands, QueueCommands};
use crate::cli::presentation::{format_queue_json, format_queue_table, QueueRow};
use crate::codec::JsonCodec;
use crate::config::{ClientConfig, ConfigLoader};
use crate::document::{FragmentDefinition, SelectionSet};
use crate::error::{ClientError, StorageError};
use crate::queue::{QueueStore, SledQueueStore};
use crate::read::GraphCache;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Contents of the `cache read --selection` file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadSelection {
    pub selection_set: SelectionSet,
    #[serde(default)]
    pub fragments: Vec<FragmentDefinition>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ReadSelection {
    pub fn fragment_map(&self) -> HashMap<String, FragmentDefinition> {
        self.fragments
            .iter()
            .map(|fragment| (fragment.name.clone(), fragment.clone()))
            .collect()
    }
}

/// Runtime context for CLI execution: workspace, effective config and storage paths.
pub struct RunContext {
    workspace_root: PathBuf,
    config: ClientConfig,
    cache_path: PathBuf,
    queue_path: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ClientError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Self::with_config(workspace_root, config)
    }

    pub fn with_config(workspace_root: PathBuf, config: ClientConfig) -> Result<Self, ClientError> {
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ClientError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        let (cache_path, queue_path) = config.storage.resolve_paths(&workspace_root);
        Ok(Self {
            workspace_root,
            config,
            cache_path,
            queue_path,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ClientError> {
        match command {
            Commands::Queue { command } => self.execute_queue(command),
            Commands::Cache { command } => self.execute_cache(command),
            Commands::Config { command } => self.execute_config(command),
        }
    }

    fn execute_queue(&self, command: &QueueCommands) -> Result<String, ClientError> {
        let queue = self.open_queue()?;
        match command {
            QueueCommands::List { format } => {
                let codec = JsonCodec;
                let rows: Vec<QueueRow> = queue
                    .entries()?
                    .iter()
                    .enumerate()
                    .map(|(position, entry)| QueueRow::from_entry(position, entry, &codec))
                    .collect();
                match format.as_str() {
                    "json" => format_queue_json(&rows),
                    "text" => Ok(format_queue_table(&rows)),
                    other => Err(ClientError::InvalidInput(format!(
                        "Unknown format '{}' (expected text or json)",
                        other
                    ))),
                }
            }
            QueueCommands::Remove {
                request_id: Some(request_id),
                ..
            } => {
                if !queue.delete(request_id)? {
                    return Err(ClientError::QueueEntryNotFound(request_id.clone()));
                }
                queue.flush()?;
                info!(request_id = %request_id, "Removed queued mutation");
                Ok(format!("Removed {}", request_id))
            }
            QueueCommands::Remove {
                request_id: None,
                position: Some(position),
            } => {
                let entry = queue.delete_at(*position)?;
                queue.flush()?;
                info!(request_id = %entry.key, position, "Removed queued mutation");
                Ok(format!("Removed {} from position {}", entry.key, position))
            }
            QueueCommands::Remove {
                request_id: None,
                position: None,
            } => Err(ClientError::InvalidInput(
                "Pass a request id or --position".to_string(),
            )),
        }
    }

    fn execute_cache(&self, command: &CacheCommands) -> Result<String, ClientError> {
        match command {
            CacheCommands::Read {
                reference,
                selection,
                partial,
            } => {
                let selection = load_selection(selection)?;
                let store = Arc::new(self.open_cache()?);
                let cache = GraphCache::from_settings(store, &self.config.cache)
                    .with_partial_data(*partial || self.config.cache.return_partial_data);
                let value = cache.denormalize(
                    Some(&selection.selection_set),
                    &crate::cache::reference(reference.as_str()),
                    &selection.fragment_map(),
                    &selection.variables,
                )?;
                serde_json::to_string_pretty(&value)
                    .map_err(|e| ClientError::InvalidInput(e.to_string()))
            }
        }
    }

    fn execute_config(&self, command: &ConfigCommands) -> Result<String, ClientError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config)
                .map_err(|e| ClientError::ConfigError(format!("Failed to render config: {}", e))),
        }
    }

    fn open_queue(&self) -> Result<SledQueueStore, ClientError> {
        std::fs::create_dir_all(&self.queue_path).map_err(StorageError::IoError)?;
        debug!(path = %self.queue_path.display(), "Opening queue store");
        Ok(SledQueueStore::new(&self.queue_path)?)
    }

    fn open_cache(&self) -> Result<SledCacheStore, ClientError> {
        std::fs::create_dir_all(&self.cache_path).map_err(StorageError::IoError)?;
        debug!(path = %self.cache_path.display(), "Opening cache store");
        Ok(SledCacheStore::new(&self.cache_path)?)
    }
}

fn load_selection(path: &Path) -> Result<ReadSelection, ClientError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ClientError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        ClientError::InvalidInput(format!("Invalid selection file {}: {}", path.display(), e))
    })
}
