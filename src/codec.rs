//! Request serialization for the durable queue.

use crate::error::{to_storage_data, StorageError};
use crate::operation::OperationRequest;

/// Converts requests to and from their persisted form.
pub trait RequestCodec: Send + Sync {
    fn serialize(&self, request: &OperationRequest) -> Result<Vec<u8>, StorageError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<OperationRequest, StorageError>;
}

/// JSON codec. Requests carry arbitrary JSON variables, so a self-describing
/// format is required.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RequestCodec for JsonCodec {
    fn serialize(&self, request: &OperationRequest) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(request).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<OperationRequest, StorageError> {
        serde_json::from_slice(bytes).map_err(to_storage_data)
    }
}
