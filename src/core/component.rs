//! Component documents and the per-instance build.
//!
//! A component file declares named configurations over shared `refs`
//! fragments and `vars` defaults. Building one instance merges the selected
//! configurations in order: resolve `$refs.*` fragments, deep-merge the
//! content into the body, apply append operations, then substitute `$vars.*`
//! placeholders.

use crate::core::path::parse_path;
use crate::core::placeholder::{resolve_deep_mapping, TokenPattern};
use crate::core::value::{deep_merge, key_display, prefix_primitive_keys, type_name};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;

/// One named variant of a component's output content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Mapping body, or a single `$refs.*` token naming one.
    pub content: Value,

    /// Variable defaults, overriding component-level `vars`.
    #[serde(default)]
    pub vars: IndexMap<String, Value>,

    /// Reference fragments, overriding component-level `refs` on collision.
    #[serde(default)]
    pub refs: IndexMap<String, Mapping>,

    /// Path-addressed mutations applied after this configuration's merge.
    #[serde(default)]
    pub append: Vec<AppendOp>,
}

/// A path-addressed append operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOp {
    /// Target path (`$`, `$.a.b`, quoted segments for literal dots).
    pub path: String,

    /// Mapping keys to insert, or sequence items to concatenate.
    pub content: Value,
}

/// A reusable component definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDoc {
    /// Named output variants, selected per instance.
    pub configurations: IndexMap<String, Configuration>,

    /// Component-wide variable defaults.
    #[serde(default)]
    pub vars: IndexMap<String, Value>,

    /// Component-wide reference fragments.
    #[serde(default)]
    pub refs: IndexMap<String, Mapping>,
}

/// Selection parameters for one component build.
#[derive(Debug, Clone, Default)]
pub struct ComponentParams {
    /// Fully-derived instance name (`type` or `type/suffix`).
    pub name: String,

    /// Configuration names to merge, in order. Empty selects `default`.
    pub configurations: Vec<String>,

    /// Pre-resolved recipe-level variable overrides.
    pub vars: HashMap<String, Value>,
}

/// Load a component definition from a YAML file.
pub fn load_component(path: &Path) -> Result<ComponentDoc, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read component {}: {}", path.display(), e))?;
    parse_component(&content)
}

/// Parse a component definition from a YAML string.
pub fn parse_component(yaml: &str) -> Result<ComponentDoc, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("component parse error: {}", e))
}

/// Build one component instance into a `{instance-name: body}` mapping.
///
/// Selected configurations apply in the given order; later configurations'
/// merges, appends, and variable overrides land on top of earlier ones. Any
/// failure aborts the build; no partial output is returned.
pub fn build_component(doc: &ComponentDoc, params: &ComponentParams) -> Result<Mapping, String> {
    let vars_pattern = TokenPattern::new(&["vars"]);
    let ref_token = Regex::new(r"^\$refs\.[^\s]+$").expect("valid ref token pattern");

    let default_selection = vec!["default".to_string()];
    let selected = if params.configurations.is_empty() {
        &default_selection
    } else {
        &params.configurations
    };

    let mut body = Mapping::new();
    for name in selected {
        let configuration = doc
            .configurations
            .get(name)
            .ok_or_else(|| format!("no configuration named '{}'", name))?;
        let refs = collect_refs(doc, configuration);
        let content = resolve_content(&configuration.content, &refs, &ref_token)?;
        deep_merge(&mut body, &content)?;
        apply_appends(&mut body, &configuration.append)?;
        let vars = collect_vars(doc, configuration, params)?;
        resolve_deep_mapping(&mut body, &vars_pattern, &vars)?;
    }

    let mut wrapped = Mapping::new();
    wrapped.insert(Value::String(params.name.clone()), Value::Mapping(body));
    Ok(wrapped)
}

/// Union of component-level and configuration-level refs, keys prefixed
/// `$refs.`. Configuration entries win on collision.
fn collect_refs(doc: &ComponentDoc, configuration: &Configuration) -> HashMap<String, Mapping> {
    let mut collected = doc.refs.clone();
    for (key, fragment) in &configuration.refs {
        collected.insert(key.clone(), fragment.clone());
    }
    collected
        .into_iter()
        .map(|(key, fragment)| (format!("$refs.{}", key), fragment))
        .collect()
}

/// Resolve a configuration's content to a standalone mapping with every
/// `$refs.*` placeholder expanded.
fn resolve_content(
    content: &Value,
    refs: &HashMap<String, Mapping>,
    ref_token: &Regex,
) -> Result<Mapping, String> {
    match content {
        Value::Mapping(map) => {
            let mut resolved = map.clone();
            resolve_mapping_refs(&mut resolved, refs, ref_token, &mut Vec::new())?;
            Ok(resolved)
        }
        Value::String(token) => resolve_ref_token(token, refs, ref_token, &mut Vec::new()),
        other => Err(format!(
            "invalid content type, must be a mapping or a ref to a mapping - it's: {}",
            type_name(other)
        )),
    }
}

/// Replace every string value of `map` that is a `$refs.*` token with its
/// resolved fragment, in place.
fn resolve_mapping_refs(
    map: &mut Mapping,
    refs: &HashMap<String, Mapping>,
    ref_token: &Regex,
    active: &mut Vec<String>,
) -> Result<(), String> {
    for (_, value) in map.iter_mut() {
        if let Value::String(s) = value {
            if ref_token.is_match(s) {
                let fragment = resolve_ref_token(s, refs, ref_token, active)?;
                *value = Value::Mapping(fragment);
            }
        }
    }
    Ok(())
}

/// Look up a ref token and return a deep copy of its fragment with nested
/// refs resolved. `active` holds the chain of tokens currently being
/// expanded; revisiting one is a cycle.
fn resolve_ref_token(
    token: &str,
    refs: &HashMap<String, Mapping>,
    ref_token: &Regex,
    active: &mut Vec<String>,
) -> Result<Mapping, String> {
    if !ref_token.is_match(token) {
        return Err(format!("'{}' is not a valid ref", token));
    }
    if active.iter().any(|t| t == token) {
        return Err(format!("cyclic reference involving '{}'", token));
    }
    let fragment = refs
        .get(token)
        .ok_or_else(|| format!("'{}' is not defined", token))?;

    active.push(token.to_string());
    let mut copy = fragment.clone();
    resolve_mapping_refs(&mut copy, refs, ref_token, active)?;
    active.pop();
    Ok(copy)
}

/// Apply a configuration's append operations, in list order.
fn apply_appends(body: &mut Mapping, appends: &[AppendOp]) -> Result<(), String> {
    for op in appends {
        let path = parse_path(&op.path)?;
        match &op.content {
            Value::Mapping(content) => append_map_items(body, &path, content)?,
            Value::Sequence(content) => append_list_items(body, &path, content)?,
            other => {
                return Err(format!(
                    "invalid append content type, must be a mapping or sequence - it's: {}",
                    type_name(other)
                ))
            }
        }
    }
    Ok(())
}

/// Walk `segments` down from `body`, requiring a mapping at every step.
/// `path` is the full parsed path, used for error messages.
fn descend<'a>(
    body: &'a mut Mapping,
    segments: &[String],
    path: &[String],
) -> Result<&'a mut Mapping, String> {
    let mut target = body;
    for segment in segments {
        target = match target.get_mut(segment.as_str()) {
            Some(Value::Mapping(next)) => next,
            _ => {
                return Err(format!(
                    "could not find item '{}' via yaml path: {:?}",
                    segment, path
                ))
            }
        };
    }
    Ok(target)
}

fn append_map_items(body: &mut Mapping, path: &[String], content: &Mapping) -> Result<(), String> {
    let target = descend(body, path, path)?;
    for (key, value) in content {
        if target.contains_key(key) {
            return Err(format!(
                "key '{}' already exists in target mapping, cannot append existing keys",
                key_display(key)
            ));
        }
        target.insert(key.clone(), value.clone());
    }
    Ok(())
}

fn append_list_items(body: &mut Mapping, path: &[String], content: &[Value]) -> Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Err("append path '$' cannot target a sequence".to_string());
    };
    let target = descend(body, parents, path)?;
    match target.get_mut(last.as_str()) {
        Some(Value::Sequence(seq)) => {
            seq.extend(content.iter().cloned());
            Ok(())
        }
        _ => Err(format!(
            "could not find sequence '{}' via yaml path: {:?}",
            last, path
        )),
    }
}

/// Overlay component vars, configuration vars, and external vars (each stage
/// overriding the prior), keys prefixed `$vars.`. Primitives only.
fn collect_vars(
    doc: &ComponentDoc,
    configuration: &Configuration,
    params: &ComponentParams,
) -> Result<HashMap<String, Value>, String> {
    let mut collected = doc.vars.clone();
    for (key, value) in &configuration.vars {
        collected.insert(key.clone(), value.clone());
    }
    for (key, value) in &params.vars {
        collected.insert(key.clone(), value.clone());
    }
    prefix_primitive_keys(&collected, "$vars.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str, params: ComponentParams) -> Result<Mapping, String> {
        build_component(&parse_component(yaml).unwrap(), &params)
    }

    fn named(name: &str) -> ComponentParams {
        ComponentParams {
            name: name.to_string(),
            ..ComponentParams::default()
        }
    }

    fn body_of<'a>(built: &'a Mapping, name: &str) -> &'a Mapping {
        built.get(name).unwrap().as_mapping().unwrap()
    }

    const OTLP_YAML: &str = r#"
configurations:
  default:
    content:
      endpoint: default_endpoint
      api_key: default_api_key
"#;

    #[test]
    fn test_default_configuration_selected_when_none_given() {
        let built = build(OTLP_YAML, named("otlp")).unwrap();
        let expected: Mapping = serde_yaml_ng::from_str(
            "otlp:\n  endpoint: default_endpoint\n  api_key: default_api_key",
        )
        .unwrap();
        assert_eq!(built, expected);
    }

    #[test]
    fn test_unknown_configuration_fails() {
        let params = ComponentParams {
            configurations: vec!["missing".to_string()],
            ..named("otlp")
        };
        let err = build(OTLP_YAML, params).unwrap_err();
        assert_eq!(err, "no configuration named 'missing'");
    }

    #[test]
    fn test_instance_name_wraps_body() {
        let built = build(OTLP_YAML, named("otlp/backup")).unwrap();
        assert!(built.contains_key("otlp/backup"));
    }

    const PROTOCOLS_YAML: &str = r#"
configurations:
  http:
    content:
      protocol:
        http:
          endpoint: 0.0.0.0:4318
  grpc:
    content:
      protocol:
        grpc:
          endpoint: 0.0.0.0:4317
  http_conflict:
    content:
      protocol:
        http:
          endpoint: 127.0.0.1:4318
"#;

    #[test]
    fn test_selected_configurations_merge_in_order() {
        let params = ComponentParams {
            configurations: vec!["http".to_string(), "grpc".to_string()],
            ..named("otlp")
        };
        let built = build(PROTOCOLS_YAML, params).unwrap();
        let protocol = body_of(&built, "otlp").get("protocol").unwrap();
        let expected: Value = serde_yaml_ng::from_str(
            "http:\n  endpoint: 0.0.0.0:4318\ngrpc:\n  endpoint: 0.0.0.0:4317",
        )
        .unwrap();
        assert_eq!(protocol, &expected);
    }

    #[test]
    fn test_overlapping_configurations_fail() {
        let params = ComponentParams {
            configurations: vec!["http".to_string(), "http_conflict".to_string()],
            ..named("otlp")
        };
        let err = build(PROTOCOLS_YAML, params).unwrap_err();
        assert!(err.contains("key overlap for 'endpoint'"));
    }

    #[test]
    fn test_repeated_sequence_fields_accumulate() {
        let yaml = r#"
configurations:
  base:
    content:
      exporters: [otlp]
  extra:
    content:
      exporters: [debug, prometheus]
"#;
        let params = ComponentParams {
            configurations: vec!["base".to_string(), "extra".to_string()],
            ..named("pipeline")
        };
        let built = build(yaml, params).unwrap();
        let exporters = body_of(&built, "pipeline").get("exporters").unwrap();
        let expected: Value = serde_yaml_ng::from_str("[otlp, debug, prometheus]").unwrap();
        assert_eq!(exporters, &expected);
    }

    #[test]
    fn test_content_as_ref_with_var_override() {
        let yaml = r#"
vars:
  first: component_default
refs:
  base:
    field: $vars.first
configurations:
  default:
    content: $refs.base
    vars:
      first: config_override
"#;
        let built = build(yaml, named("c")).unwrap();
        assert_eq!(
            body_of(&built, "c").get("field").unwrap(),
            &Value::String("config_override".into())
        );
    }

    #[test]
    fn test_nested_refs_resolve_recursively() {
        let yaml = r#"
refs:
  outer:
    inner: $refs.inner
    label: outer
  inner:
    leaf: true
configurations:
  default:
    content:
      tree: $refs.outer
"#;
        let built = build(yaml, named("c")).unwrap();
        let expected: Value =
            serde_yaml_ng::from_str("inner:\n  leaf: true\nlabel: outer").unwrap();
        assert_eq!(body_of(&built, "c").get("tree").unwrap(), &expected);
    }

    #[test]
    fn test_configuration_refs_override_component_refs() {
        let yaml = r#"
refs:
  base:
    from: component
configurations:
  default:
    content: $refs.base
    refs:
      base:
        from: configuration
"#;
        let built = build(yaml, named("c")).unwrap();
        assert_eq!(
            body_of(&built, "c").get("from").unwrap(),
            &Value::String("configuration".into())
        );
    }

    #[test]
    fn test_undefined_ref_fails() {
        let yaml = r#"
configurations:
  default:
    content: $refs.ghost
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert_eq!(err, "'$refs.ghost' is not defined");
    }

    #[test]
    fn test_cyclic_refs_detected() {
        let yaml = r#"
refs:
  a:
    next: $refs.b
  b:
    next: $refs.a
configurations:
  default:
    content: $refs.a
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("cyclic reference"));
        assert!(err.contains("$refs."));
    }

    #[test]
    fn test_self_referential_ref_detected() {
        let yaml = r#"
refs:
  loop:
    again: $refs.loop
configurations:
  default:
    content: $refs.loop
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("cyclic reference involving '$refs.loop'"));
    }

    #[test]
    fn test_shared_ref_fragment_not_mutated_across_uses() {
        // Both configurations expand the same fragment and then diverge via
        // appends; the second build must see the pristine fragment.
        let yaml = r#"
refs:
  base:
    settings:
      shared: true
configurations:
  first:
    content: $refs.base
    append:
      - path: $.settings
        content:
          only_first: yes
  second:
    content:
      other: $refs.base
"#;
        let params = ComponentParams {
            configurations: vec!["first".to_string()],
            ..named("c")
        };
        let doc = parse_component(yaml).unwrap();
        let first = build_component(&doc, &params).unwrap();
        assert!(body_of(&first, "c")
            .get("settings")
            .unwrap()
            .as_mapping()
            .unwrap()
            .contains_key("only_first"));

        let second = build_component(
            &doc,
            &ComponentParams {
                configurations: vec!["second".to_string()],
                ..named("c")
            },
        )
        .unwrap();
        let other = body_of(&second, "c").get("other").unwrap();
        let expected: Value = serde_yaml_ng::from_str("settings:\n  shared: true").unwrap();
        assert_eq!(other, &expected);
    }

    #[test]
    fn test_invalid_content_type_fails() {
        let yaml = r#"
configurations:
  default:
    content: [not, a, mapping]
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("invalid content type"));
        assert!(err.contains("sequence"));
    }

    #[test]
    fn test_append_mapping_at_root() {
        let yaml = r#"
configurations:
  default:
    content:
      existing: value
    append:
      - path: $
        content:
          added: extra
"#;
        let built = build(yaml, named("c")).unwrap();
        assert_eq!(
            body_of(&built, "c").get("added").unwrap(),
            &Value::String("extra".into())
        );
    }

    #[test]
    fn test_append_sequence_extends_existing_list() {
        let yaml = r#"
configurations:
  default:
    content:
      pipeline:
        some_list: [a]
    append:
      - path: $.pipeline.some_list
        content: [b, c]
"#;
        let built = build(yaml, named("c")).unwrap();
        let list = body_of(&built, "c")
            .get("pipeline")
            .unwrap()
            .as_mapping()
            .unwrap()
            .get("some_list")
            .unwrap();
        let expected: Value = serde_yaml_ng::from_str("[a, b, c]").unwrap();
        assert_eq!(list, &expected);
    }

    #[test]
    fn test_append_existing_key_fails() {
        let yaml = r#"
configurations:
  default:
    content:
      existing: value
    append:
      - path: $
        content:
          existing: other
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("key 'existing' already exists"));
    }

    #[test]
    fn test_append_missing_intermediate_fails() {
        let yaml = r#"
configurations:
  default:
    content:
      top: {}
    append:
      - path: $.top.missing.leaf
        content:
          x: 1
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("could not find item 'missing'"));
        assert!(err.contains("yaml path"));
    }

    #[test]
    fn test_append_sequence_requires_existing_list() {
        let yaml = r#"
configurations:
  default:
    content:
      pipeline: {}
    append:
      - path: $.pipeline.some_list
        content: [a]
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("could not find sequence 'some_list'"));
    }

    #[test]
    fn test_append_sequence_at_root_fails() {
        let yaml = r#"
configurations:
  default:
    content: {}
    append:
      - path: $
        content: [a]
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("cannot target a sequence"));
    }

    #[test]
    fn test_append_scalar_content_fails() {
        let yaml = r#"
configurations:
  default:
    content: {}
    append:
      - path: $
        content: just-a-string
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("invalid append content type"));
    }

    #[test]
    fn test_append_bad_path_syntax_fails() {
        let yaml = r#"
configurations:
  default:
    content: {}
    append:
      - path: $.a.
        content:
          x: 1
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert_eq!(err, "invalid yaml path: $.a.");
    }

    #[test]
    fn test_full_string_var_keeps_type() {
        let yaml = r#"
vars:
  insecure: true
  port: 4317
configurations:
  default:
    content:
      insecure: $vars.insecure
      port: $vars.port
"#;
        let built = build(yaml, named("c")).unwrap();
        let body = body_of(&built, "c");
        assert_eq!(body.get("insecure").unwrap(), &Value::Bool(true));
        assert_eq!(body.get("port").unwrap(), &Value::from(4317));
    }

    #[test]
    fn test_external_vars_override_configuration_vars() {
        let yaml = r#"
vars:
  level: component
configurations:
  default:
    content:
      level: $vars.level
    vars:
      level: configuration
"#;
        let mut external = HashMap::new();
        external.insert("level".to_string(), Value::String("external".into()));
        let params = ComponentParams {
            vars: external,
            ..named("c")
        };
        let built = build(yaml, params).unwrap();
        assert_eq!(
            body_of(&built, "c").get("level").unwrap(),
            &Value::String("external".into())
        );
    }

    #[test]
    fn test_undefined_var_fails() {
        let yaml = r#"
configurations:
  default:
    content:
      field: $vars.ghost
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert_eq!(err, "'$vars.ghost' is not defined");
    }

    #[test]
    fn test_non_primitive_var_fails() {
        let yaml = r#"
configurations:
  default:
    content: {}
    vars:
      bad: [1, 2]
"#;
        let err = build(yaml, named("c")).unwrap_err();
        assert!(err.contains("'$vars.bad'"));
        assert!(err.contains("only primitive values"));
    }

    #[test]
    fn test_later_configuration_vars_rewrite_later_tokens_only() {
        // Vars substitute at the end of each configuration pass, so the
        // first configuration's body is already resolved when the second
        // configuration's overrides arrive.
        let yaml = r#"
configurations:
  first:
    content:
      a: $vars.x
    vars:
      x: from_first
  second:
    content:
      b: $vars.x
    vars:
      x: from_second
"#;
        let params = ComponentParams {
            configurations: vec!["first".to_string(), "second".to_string()],
            ..named("c")
        };
        let built = build(yaml, params).unwrap();
        let body = body_of(&built, "c");
        assert_eq!(body.get("a").unwrap(), &Value::String("from_first".into()));
        assert_eq!(body.get("b").unwrap(), &Value::String("from_second".into()));
    }

    #[test]
    fn test_load_component_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otlp.yml");
        std::fs::write(&path, OTLP_YAML).unwrap();
        let doc = load_component(&path).unwrap();
        assert!(doc.configurations.contains_key("default"));
    }

    #[test]
    fn test_load_component_missing_file() {
        let err = load_component(Path::new("/nonexistent/otlp.yml")).unwrap_err();
        assert!(err.contains("cannot read component"));
    }

    #[test]
    fn test_parse_component_requires_configurations() {
        assert!(parse_component("vars:\n  a: 1").is_err());
    }
}
