//! Operation requests and the responses observed for them.

use crate::document::{Document, OperationKind};
use crate::types::{DataSource, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One logical query/mutation invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub request_id: RequestId,
    pub document: Document,
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Client-predicted result applied to the cache before the network answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimistic_response: Option<Value>,
}

impl OperationRequest {
    pub fn new(request_id: impl Into<RequestId>, document: Document) -> Self {
        Self {
            request_id: request_id.into(),
            document,
            variables: Map::new(),
            optimistic_response: None,
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_optimistic_response(mut self, payload: Value) -> Self {
        self.optimistic_response = Some(payload);
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.document.kind()
    }

    pub fn is_mutation(&self) -> bool {
        self.kind() == OperationKind::Mutation
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.document.operation_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

/// One observed result for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub request: OperationRequest,
    pub data_source: DataSource,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

impl OperationResponse {
    pub fn new(request: OperationRequest, data_source: DataSource, data: Option<Value>) -> Self {
        Self {
            request,
            data_source,
            data,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<GraphqlError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request.request_id
    }
}
