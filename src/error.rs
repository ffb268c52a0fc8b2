//! Error types for the graphcache client data layer.

use crate::operation::OperationResponse;
use thiserror::Error;

/// Storage-related errors (cache records and queue entries)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Queue position {index} out of range (queue holds {len} entries)")]
    PositionOutOfRange { index: usize, len: usize },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while denormalizing store data into a response shape.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Missing field '{field}' on {typename} at {path}")]
    IncompleteData {
        typename: String,
        field: String,
        path: String,
    },

    #[error("Expected an object or list at {path}, found {found}")]
    Structural { path: String, found: String },

    #[error("Unknown fragment: {0}")]
    UnknownFragment(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors carried on response streams through the link chain.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// A mutation response that was not judged dequeue-worthy. The queue entry is kept.
    #[error("Mutation {} rejected: {}", .0.request.request_id, summarize_errors(.0))]
    Rejected(Box<OperationResponse>),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Queue storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for LinkError {
    fn from(err: StorageError) -> Self {
        LinkError::Storage(err.to_string())
    }
}

fn summarize_errors(response: &OperationResponse) -> String {
    if response.errors.is_empty() {
        return "no errors reported".to_string();
    }
    response
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level errors for the configuration and CLI surface.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Read error: {0}")]
    ReadError(#[from] ReadError),

    #[error("Link error: {0}")]
    LinkError(#[from] LinkError),

    #[error("Queue entry not found: {0}")]
    QueueEntryNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::ConfigError(err.to_string())
    }
}

pub(crate) fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        err.to_string(),
    ))
}

pub(crate) fn to_storage_data(err: impl std::fmt::Display) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        err.to_string(),
    ))
}
