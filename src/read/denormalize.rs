//! Denormalizer
//!
//! Rebuilds a nested response value from a selection set and flat store data.
//! The walk is synchronous and pure over one store snapshot: references are
//! resolved through the store, dangling references are pruned, and a missing
//! field either fails the read or is omitted, depending on the partial-data mode.

use crate::cache::{as_reference, storage_key, RecordSource};
use crate::document::{FragmentDefinition, SelectionSet};
use crate::error::ReadError;
use crate::read::fragments::{expand_selections, PossibleTypes};
use crate::read::policy::{ReadContext, TypePolicies};
use crate::types::TYPENAME_FIELD;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;

/// Everything one denormalization call reads from.
pub struct DenormalizeConfig<'a> {
    pub source: &'a dyn RecordSource,
    pub policies: &'a TypePolicies,
    pub possible_types: &'a PossibleTypes,
    pub fragments: &'a HashMap<String, FragmentDefinition>,
    pub variables: &'a Map<String, Value>,
    /// Omit missing fields instead of failing the read.
    pub return_partial_data: bool,
}

enum PathSegment {
    Key(String),
    Index(usize),
}

/// Denormalize `raw` against `selection_set`.
///
/// A `None` selection set marks a leaf: the raw value is returned as-is.
pub fn denormalize(
    selection_set: Option<&SelectionSet>,
    raw: &Value,
    config: &DenormalizeConfig<'_>,
) -> Result<Value, ReadError> {
    let mut path = Vec::new();
    walk(selection_set, raw, config, &mut path)
}

fn walk(
    selection_set: Option<&SelectionSet>,
    raw: &Value,
    config: &DenormalizeConfig<'_>,
    path: &mut Vec<PathSegment>,
) -> Result<Value, ReadError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if let Value::Array(items) = raw {
        return walk_list(selection_set, items, config, path);
    }
    let Some(selection_set) = selection_set else {
        return Ok(raw.clone());
    };

    match raw {
        Value::Object(map) => match as_reference(raw) {
            Some(id) => match config.source.read(id)? {
                Some(record) => walk_record(selection_set, &record.fields, config, path),
                None => {
                    debug!(reference = id, path = %format_path(path), "Dangling reference read as null");
                    Ok(Value::Null)
                }
            },
            None => walk_record(selection_set, map, config, path),
        },
        other => Err(ReadError::Structural {
            path: format_path(path),
            found: kind_of(other).to_string(),
        }),
    }
}

fn walk_list(
    selection_set: Option<&SelectionSet>,
    items: &[Value],
    config: &DenormalizeConfig<'_>,
    path: &mut Vec<PathSegment>,
) -> Result<Value, ReadError> {
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        path.push(PathSegment::Index(index));
        let value = match as_reference(item) {
            Some(id) => match config.source.read(id)? {
                Some(record) => Some(match selection_set {
                    Some(selection_set) => walk_record(selection_set, &record.fields, config, path)?,
                    None => item.clone(),
                }),
                None => None,
            },
            None => Some(walk(selection_set, item, config, path)?),
        };
        if value.is_none() {
            debug!(path = %format_path(path), "Pruned dangling reference from list");
        }
        path.pop();
        out.extend(value);
    }
    Ok(Value::Array(out))
}

fn walk_record(
    selection_set: &SelectionSet,
    record: &Map<String, Value>,
    config: &DenormalizeConfig<'_>,
    path: &mut Vec<PathSegment>,
) -> Result<Value, ReadError> {
    let typename = record.get(TYPENAME_FIELD).and_then(Value::as_str);
    let type_policy = typename.and_then(|t| config.policies.get(t));
    let fields = expand_selections(selection_set, typename, config.fragments, config.possible_types)?;

    let mut out = Map::new();
    for field in fields {
        let policy = type_policy.and_then(|p| p.fields.get(&field.name));
        let key = storage_key(field, config.variables, policy.and_then(|p| p.key_args.as_deref()));
        let stored = record.get(&key);
        let response_key = field.response_key();

        path.push(PathSegment::Key(response_key.to_string()));
        if let Some(reader) = policy.and_then(|p| p.read.as_ref()) {
            let context = ReadContext {
                field,
                typename,
                storage_key: &key,
                config,
            };
            out.insert(response_key.to_string(), reader(stored, &context));
        } else if let Some(stored) = stored {
            let value = walk(field.selection_set.as_ref(), stored, config, path)?;
            out.insert(response_key.to_string(), value);
        } else if !config.return_partial_data {
            return Err(ReadError::IncompleteData {
                typename: typename.unwrap_or("<anonymous>").to_string(),
                field: key,
                path: format_path(path),
            });
        }
        path.pop();
    }

    if out.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(out))
    }
}

fn format_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    let mut out = String::new();
    for segment in path {
        match segment {
            PathSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(index) => {
                let _ = write!(out, "[{index}]");
            }
        }
    }
    out
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
