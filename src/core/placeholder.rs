//! Placeholder substitution over namespaced tokens such as `$vars.endpoint`.
//!
//! A token that spans an entire string resolves to the scope value with its
//! original type (a boolean variable stays a boolean). Tokens embedded in a
//! longer string are replaced textually and must name string values. Tokens
//! run from the namespace marker to the next whitespace character.

use regex::Regex;
use serde_yaml_ng::{Mapping, Value};
use std::collections::HashMap;

/// Compiled token grammar for one family of namespaces.
///
/// Owned by the resolution pass that needs it. The grammar is fixed at
/// construction and the matcher carries no mutable state.
#[derive(Debug)]
pub struct TokenPattern {
    /// Matches a token anywhere inside a string.
    any: Regex,
    /// Matches a string that is exactly one token.
    full: Regex,
}

impl TokenPattern {
    /// Compile the grammar for the given namespaces (e.g. `["vars"]` or
    /// `["const", "args", "features", "components"]`).
    pub fn new(namespaces: &[&str]) -> Self {
        let parts: Vec<String> = namespaces
            .iter()
            .map(|ns| format!(r"\${}\.[^\s]+", ns))
            .collect();
        let full_parts: Vec<String> = parts.iter().map(|p| format!("^{}$", p)).collect();
        Self {
            any: Regex::new(&parts.join("|")).expect("valid token pattern"),
            full: Regex::new(&full_parts.join("|")).expect("valid token pattern"),
        }
    }
}

/// Resolve the placeholders in one string against a scope.
///
/// Returns the scope value itself for a full-string token, a new string with
/// every embedded token replaced, or the input unchanged when no token is
/// present.
pub fn resolve_scalar(
    value: &str,
    pattern: &TokenPattern,
    scope: &HashMap<String, Value>,
) -> Result<Value, String> {
    if pattern.full.is_match(value) {
        return scope
            .get(value)
            .cloned()
            .ok_or_else(|| format!("'{}' is not defined", value));
    }

    // Distinct tokens in first-seen order; each replacement covers every
    // occurrence of that token.
    let mut tokens: Vec<&str> = Vec::new();
    for found in pattern.any.find_iter(value) {
        if !tokens.contains(&found.as_str()) {
            tokens.push(found.as_str());
        }
    }
    if tokens.is_empty() {
        return Ok(Value::String(value.to_string()));
    }

    let mut resolved = value.to_string();
    for token in tokens {
        match scope.get(token) {
            Some(Value::String(s)) => resolved = resolved.replace(token, s),
            Some(other) => {
                return Err(format!(
                    "'{}' is a {} and cannot be embedded in text",
                    token,
                    crate::core::value::type_name(other)
                ))
            }
            None => return Err(format!("'{}' is not defined", token)),
        }
    }
    Ok(Value::String(resolved))
}

/// Resolve placeholders in every string leaf of a value tree, in place.
pub fn resolve_deep(
    node: &mut Value,
    pattern: &TokenPattern,
    scope: &HashMap<String, Value>,
) -> Result<(), String> {
    match node {
        Value::Mapping(map) => resolve_deep_mapping(map, pattern, scope)?,
        Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                resolve_deep(item, pattern, scope)?;
            }
        }
        Value::String(s) => {
            let resolved = resolve_scalar(s, pattern, scope)?;
            *node = resolved;
        }
        _ => {}
    }
    Ok(())
}

/// Resolve placeholders in every string leaf below a mapping, in place.
pub fn resolve_deep_mapping(
    map: &mut Mapping,
    pattern: &TokenPattern,
    scope: &HashMap<String, Value>,
) -> Result<(), String> {
    for (_, value) in map.iter_mut() {
        resolve_deep(value, pattern, scope)?;
    }
    Ok(())
}
