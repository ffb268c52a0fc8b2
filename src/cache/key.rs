//! Field storage keys.

use crate::document::Field;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Storage key for `field`: the bare name, or `name(<args>)` with canonical JSON args.
///
/// Arguments whose variable is unset are dropped. When `key_args` is given,
/// only those arguments take part; an empty list yields the bare name.
pub fn storage_key(field: &Field, variables: &Map<String, Value>, key_args: Option<&[String]>) -> String {
    let mut args = BTreeMap::new();
    for argument in &field.arguments {
        if let Some(allowed) = key_args {
            if !allowed.iter().any(|name| name == &argument.name) {
                continue;
            }
        }
        if let Some(value) = argument.value.resolve(variables) {
            args.insert(argument.name.as_str(), value);
        }
    }

    if args.is_empty() {
        return field.name.clone();
    }
    let mut key = format!("{}({{", field.name);
    for (index, (name, value)) in args.iter().enumerate() {
        if index > 0 {
            key.push(',');
        }
        key.push_str(&Value::String((*name).to_string()).to_string());
        key.push(':');
        write_canonical(&mut key, value);
    }
    key.push_str("})");
    key
}

/// JSON text with object keys sorted at every depth.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (index, (key, value)) in sorted.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, value);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
