//! Cache reads
//!
//! Materializes responses from the normalized store: the field policy
//! registry, the fragment expander, the denormalizer, and the `GraphCache`
//! facade that wires them to a store.

pub mod denormalize;
pub mod fragments;
pub mod policy;

pub use denormalize::{denormalize, DenormalizeConfig};
pub use fragments::{expand_selections, PossibleTypes};
pub use policy::{FieldPolicy, FieldReader, ReadContext, TypePolicies, TypePolicy};

use crate::cache::{reference, CacheStore};
use crate::config::CacheSettings;
use crate::document::{FragmentDefinition, SelectionSet};
use crate::error::ReadError;
use crate::operation::OperationRequest;
use crate::types::TYPENAME_FIELD;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Read facade over a cache store.
pub struct GraphCache {
    store: Arc<dyn CacheStore>,
    policies: TypePolicies,
    possible_types: PossibleTypes,
    return_partial_data: bool,
}

impl GraphCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            policies: TypePolicies::new(),
            possible_types: PossibleTypes::new(),
            return_partial_data: false,
        }
    }

    pub fn from_settings(store: Arc<dyn CacheStore>, settings: &CacheSettings) -> Self {
        Self::new(store)
            .with_possible_types(settings.possible_types())
            .with_partial_data(settings.return_partial_data)
    }

    pub fn with_policies(mut self, policies: TypePolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_possible_types(mut self, possible_types: PossibleTypes) -> Self {
        self.possible_types = possible_types;
        self
    }

    pub fn with_partial_data(mut self, return_partial_data: bool) -> Self {
        self.return_partial_data = return_partial_data;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Read the operation's result from its root record.
    ///
    /// An absent root record behaves like an empty one: strict reads fail on
    /// the first field, partial reads return null.
    pub fn read_query(&self, request: &OperationRequest) -> Result<Value, ReadError> {
        let kind = request.kind();
        let root = match self.store.read(kind.root_record_id())? {
            Some(record) => record.fields,
            None => {
                let mut fields = Map::new();
                fields.insert(
                    TYPENAME_FIELD.to_string(),
                    Value::String(kind.root_typename().to_string()),
                );
                fields
            }
        };
        self.denormalize(
            Some(&request.document.operation.selection_set),
            &Value::Object(root),
            &request.document.fragments,
            &request.variables,
        )
    }

    /// Read one record through a named fragment. A missing record reads as null.
    pub fn read_fragment(
        &self,
        id: &str,
        fragments: &HashMap<String, FragmentDefinition>,
        fragment_name: &str,
        variables: &Map<String, Value>,
    ) -> Result<Value, ReadError> {
        let fragment = fragments
            .get(fragment_name)
            .ok_or_else(|| ReadError::UnknownFragment(fragment_name.to_string()))?;
        self.denormalize(
            Some(&fragment.selection_set),
            &reference(id),
            fragments,
            variables,
        )
    }

    /// Denormalize arbitrary raw data with this cache's policies.
    pub fn denormalize(
        &self,
        selection_set: Option<&SelectionSet>,
        raw: &Value,
        fragments: &HashMap<String, FragmentDefinition>,
        variables: &Map<String, Value>,
    ) -> Result<Value, ReadError> {
        let config = DenormalizeConfig {
            source: &self.store,
            policies: &self.policies,
            possible_types: &self.possible_types,
            fragments,
            variables,
            return_partial_data: self.return_partial_data,
        };
        denormalize(selection_set, raw, &config)
    }
}
