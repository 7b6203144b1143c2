//! Generic YAML value utilities shared by the component and recipe layers.
//!
//! Everything above the value layer works on `serde_yaml_ng::Value` trees and
//! relies on these helpers to combine them without silently losing data.

use serde_yaml_ng::{Mapping, Value};
use std::collections::HashMap;

/// True for the scalar kinds a variable, constant, or argument may hold.
pub fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Bool(_) | Value::Number(_))
}

/// Name a value's kind for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

/// Render a mapping key for error messages.
pub fn key_display(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("{:?}", other),
    }
}

/// Merge `src` into `dst`, key by key.
///
/// Absent keys are copied over. Keys present on both sides recurse when both
/// values are mappings and concatenate when both are sequences; any other
/// overlap is a conflict. Merging never silently overwrites data.
pub fn deep_merge(dst: &mut Mapping, src: &Mapping) -> Result<(), String> {
    for (key, src_val) in src {
        match dst.get_mut(key) {
            None => {
                dst.insert(key.clone(), src_val.clone());
            }
            Some(dst_val) => match (dst_val, src_val) {
                (Value::Mapping(d), Value::Mapping(s)) => deep_merge(d, s)?,
                (Value::Sequence(d), Value::Sequence(s)) => d.extend(s.iter().cloned()),
                _ => return Err(format!("key overlap for '{}'", key_display(key))),
            },
        }
    }
    Ok(())
}

/// Rebuild a name→value mapping with every key prefixed, producing a
/// namespaced scope. Fails on any non-primitive value.
pub fn prefix_primitive_keys(
    map: &indexmap::IndexMap<String, Value>,
    prefix: &str,
) -> Result<HashMap<String, Value>, String> {
    let mut prefixed = HashMap::with_capacity(map.len());
    for (key, value) in map {
        let name = format!("{}{}", prefix, key);
        if !is_primitive(value) {
            return Err(format!(
                "'{}' is not valid, only primitive values are allowed",
                name
            ));
        }
        prefixed.insert(name, value.clone());
    }
    Ok(prefixed)
}
