//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ClientError, ReadError, StorageError};

/// Map domain errors to a single line for CLI output.
pub fn map_error(e: &ClientError) -> String {
    match e {
        ClientError::StorageError(StorageError::PositionOutOfRange { index, len }) => {
            format!("No queue entry at position {} (queue holds {})", index, len)
        }
        ClientError::ReadError(ReadError::IncompleteData { .. }) => {
            format!("{} (use --partial to omit missing fields)", e)
        }
        _ => e.to_string(),
    }
}
