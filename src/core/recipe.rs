//! Recipe documents and the top-level build.
//!
//! A recipe declares component instances, arguments (CLI overrides with
//! environment fallback), global constants, and a services section. Building
//! a recipe resolves the `$args.*`/`$const.*`/`$features.*` scope once, then
//! builds each instance against it and merges everything into one document.

use crate::core::component::{build_component, load_component, ComponentParams};
use crate::core::placeholder::{resolve_deep, resolve_scalar, TokenPattern};
use crate::core::value::{deep_merge, prefix_primitive_keys};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A declared recipe argument, supplied via `-A` or an environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgSpec {
    /// Environment variable consulted when no override is given.
    #[serde(default)]
    pub env: Option<String>,

    /// Shown by `mezcla info`.
    #[serde(default)]
    pub description: Option<String>,
}

/// One declared use of a component definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentInstance {
    /// Source path relative to the components root, e.g. `receivers/otlp.yml`.
    pub source: String,

    /// Optional instance suffix, producing `type/name`.
    #[serde(default)]
    pub name: Option<String>,

    /// Configuration names to merge, in order. Empty selects `default`.
    #[serde(default)]
    pub configurations: Vec<String>,

    /// Local variable overrides, resolved against the recipe scope.
    #[serde(default)]
    pub vars: IndexMap<String, Value>,
}

/// Top-level recipe document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Shown by `mezcla info`.
    #[serde(default)]
    pub description: Option<String>,

    /// Declared arguments.
    #[serde(default)]
    pub args: IndexMap<String, ArgSpec>,

    /// Global primitive constants.
    #[serde(default, rename = "const")]
    pub constants: IndexMap<String, Value>,

    /// Component instances, built in declaration order.
    pub components: IndexMap<String, ComponentInstance>,

    /// Services section, copied into the output after substitution.
    pub services: Value,
}

/// Caller-supplied inputs for one recipe build.
#[derive(Debug, Clone, Default)]
pub struct RecipeParams {
    /// Explicit argument overrides (CLI `-A name=value`).
    pub args: HashMap<String, String>,

    /// Directory containing component definition files.
    pub components_dir: PathBuf,
}

/// Load a recipe from a YAML file.
pub fn load_recipe(path: &Path) -> Result<Recipe, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read recipe {}: {}", path.display(), e))?;
    parse_recipe(&content)
}

/// Parse a recipe from a YAML string.
pub fn parse_recipe(yaml: &str) -> Result<Recipe, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("recipe parse error: {}", e))
}

/// Build a recipe into the final merged output document.
///
/// `lookup_env` supplies environment values for declared arguments; the rest
/// of the build only touches the filesystem to read component sources.
pub fn build_recipe(
    recipe: &Recipe,
    params: &RecipeParams,
    lookup_env: impl Fn(&str) -> Option<String>,
) -> Result<Mapping, String> {
    let instance_names = derive_instance_names(recipe)?;
    let scope = collect_scope(recipe, params, &instance_names, &lookup_env)?;
    let pattern = TokenPattern::new(&["const", "args", "features", "components"]);

    // Instances sharing a source directory land under one top-level key.
    let mut groups: IndexMap<String, Mapping> = IndexMap::new();
    for (key, instance) in &recipe.components {
        let vars = resolve_instance_vars(&instance.vars, &pattern, &scope)?;
        let doc = load_component(&params.components_dir.join(&instance.source))?;
        let built = build_component(
            &doc,
            &ComponentParams {
                name: instance_names[key].clone(),
                configurations: instance.configurations.clone(),
                vars,
            },
        )?;
        let group = group_key(&instance.source)?;
        deep_merge(groups.entry(group).or_default(), &built)?;
    }

    let mut output = Mapping::new();
    for (group, members) in groups {
        output.insert(Value::String(group), Value::Mapping(members));
    }

    let mut services = recipe.services.clone();
    resolve_deep(&mut services, &pattern, &scope)?;
    let mut services_doc = Mapping::new();
    services_doc.insert(Value::String("services".to_string()), services);
    deep_merge(&mut output, &services_doc)?;

    Ok(output)
}

/// Derive each instance's name: source file stem, plus `/suffix` when an
/// explicit name was given.
fn derive_instance_names(recipe: &Recipe) -> Result<IndexMap<String, String>, String> {
    let stem = Regex::new(r"^(.+)\.[yY][aA]?[mM][lL]$").expect("valid file name pattern");
    let mut names = IndexMap::new();
    for (key, instance) in &recipe.components {
        let file_name = Path::new(&instance.source)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| malformed_source(&instance.source))?;
        let type_name = stem
            .captures(file_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| malformed_source(&instance.source))?;
        let name = match instance.name.as_deref() {
            Some(suffix) if !suffix.is_empty() => format!("{}/{}", type_name, suffix),
            _ => type_name,
        };
        names.insert(key.clone(), name);
    }
    Ok(names)
}

fn malformed_source(source: &str) -> String {
    format!("could not get component type from source path: '{}'", source)
}

/// Top-level output key for an instance: the source's containing directory.
fn group_key(source: &str) -> Result<String, String> {
    Path::new(source)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            format!(
                "could not derive a group from source path '{}': expected '<group>/<file>'",
                source
            )
        })
}

/// Union of the argument, constant, and instance-name namespaces. The
/// distinct prefixes keep the namespaces collision-free.
fn collect_scope(
    recipe: &Recipe,
    params: &RecipeParams,
    instance_names: &IndexMap<String, String>,
    lookup_env: &impl Fn(&str) -> Option<String>,
) -> Result<HashMap<String, Value>, String> {
    let mut scope = collect_args(&recipe.args, &params.args, lookup_env)?;
    scope.extend(prefix_primitive_keys(&recipe.constants, "$const.")?);

    let names: IndexMap<String, Value> = instance_names
        .iter()
        .map(|(key, name)| (key.clone(), Value::String(name.clone())))
        .collect();
    scope.extend(prefix_primitive_keys(&names, "$features.")?);
    scope.extend(prefix_primitive_keys(&names, "$components.")?);
    Ok(scope)
}

/// Collect argument values: explicit overrides win, then the declared env
/// var. A declared argument with neither is fatal.
fn collect_args(
    specs: &IndexMap<String, ArgSpec>,
    provided: &HashMap<String, String>,
    lookup_env: &impl Fn(&str) -> Option<String>,
) -> Result<HashMap<String, Value>, String> {
    let mut collected: IndexMap<String, Value> = provided
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    for (name, spec) in specs {
        if collected.contains_key(name) {
            continue;
        }
        let value = spec
            .env
            .as_deref()
            .and_then(|env| lookup_env(env))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing_arg(name, spec))?;
        collected.insert(name.clone(), Value::String(value));
    }
    prefix_primitive_keys(&collected, "$args.")
}

fn missing_arg(name: &str, spec: &ArgSpec) -> String {
    match spec.env.as_deref() {
        Some(env) if !env.is_empty() => format!(
            "missing value for argument '{}': pass -A{}=<value> or set env var '{}'",
            name, name, env
        ),
        _ => format!(
            "missing value for argument '{}': pass -A{}=<value>",
            name, name
        ),
    }
}

/// Resolve an instance's local vars against the recipe scope. String values
/// get one substitution pass; everything else is carried as-is.
fn resolve_instance_vars(
    vars: &IndexMap<String, Value>,
    pattern: &TokenPattern,
    scope: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, String> {
    let mut resolved = HashMap::with_capacity(vars.len());
    for (name, value) in vars {
        let value = match value {
            Value::String(s) => resolve_scalar(s, pattern, scope)?,
            other => other.clone(),
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}
