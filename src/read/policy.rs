//! Field Policy Registry
//!
//! Per-type field overrides, held as data: a map from type name to the
//! policies of its fields. A field without a policy uses the default storage
//! key and a recursive read.

use crate::cache::NormalizedRecord;
use crate::document::Field;
use crate::error::StorageError;
use crate::read::denormalize::DenormalizeConfig;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Custom reader. Receives the raw stored value, absent when the record lacks
/// the field, and its result is used as the field's output.
pub type FieldReader = Arc<dyn Fn(Option<&Value>, &ReadContext<'_>) -> Value + Send + Sync>;

/// What a custom reader can see about the field being read.
pub struct ReadContext<'a> {
    pub field: &'a Field,
    pub typename: Option<&'a str>,
    pub storage_key: &'a str,
    pub config: &'a DenormalizeConfig<'a>,
}

impl ReadContext<'_> {
    pub fn variables(&self) -> &Map<String, Value> {
        self.config.variables
    }

    /// Look up another record in the same store snapshot.
    pub fn read_record(&self, id: &str) -> Result<Option<NormalizedRecord>, StorageError> {
        self.config.source.read(id)
    }
}

#[derive(Clone, Default)]
pub struct FieldPolicy {
    pub read: Option<FieldReader>,
    /// Arguments that take part in the storage key. `None` means all of them.
    pub key_args: Option<Vec<String>>,
}

impl FieldPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader<F>(mut self, reader: F) -> Self
    where
        F: Fn(Option<&Value>, &ReadContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.read = Some(Arc::new(reader));
        self
    }

    pub fn with_key_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPolicy")
            .field("read", &self.read.as_ref().map(|_| "<reader>"))
            .field("key_args", &self.key_args)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypePolicy {
    pub fields: HashMap<String, FieldPolicy>,
}

/// Type name -> field policies.
#[derive(Debug, Clone, Default)]
pub struct TypePolicies {
    types: HashMap<String, TypePolicy>,
}

impl TypePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, typename: impl Into<String>, field: impl Into<String>, policy: FieldPolicy) {
        self.types
            .entry(typename.into())
            .or_default()
            .fields
            .insert(field.into(), policy);
    }

    pub fn with_field_policy(
        mut self,
        typename: impl Into<String>,
        field: impl Into<String>,
        policy: FieldPolicy,
    ) -> Self {
        self.insert(typename, field, policy);
        self
    }

    pub fn get(&self, typename: &str) -> Option<&TypePolicy> {
        self.types.get(typename)
    }

    pub fn field(&self, typename: &str, field: &str) -> Option<&FieldPolicy> {
        self.types.get(typename)?.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
