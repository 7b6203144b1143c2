//! CLI subcommands: build and info.

use crate::core::recipe::{self, RecipeParams};
use clap::Subcommand;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a collector configuration from a recipe
    Build {
        /// Path to the recipe file
        recipe: PathBuf,

        /// Argument override, repeatable
        #[arg(short = 'A', value_name = "NAME=VALUE")]
        arg: Vec<String>,

        /// Output YAML file path ('-' for stdout)
        #[arg(short, long, default_value = "otel.yml")]
        output: PathBuf,

        /// Directory containing component definitions
        #[arg(long, default_value = "components")]
        components_dir: PathBuf,
    },

    /// Show a recipe's description and arguments
    Info {
        /// Path to the recipe file
        recipe: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Build {
            recipe,
            arg,
            output,
            components_dir,
        } => cmd_build(&recipe, &arg, &output, &components_dir),
        Commands::Info { recipe } => cmd_info(&recipe),
    }
}

fn cmd_build(
    recipe_path: &Path,
    arg_overrides: &[String],
    output: &Path,
    components_dir: &Path,
) -> Result<(), String> {
    let recipe = recipe::load_recipe(recipe_path)?;
    let args = parse_arg_overrides(arg_overrides)?;
    let built = recipe::build_recipe(
        &recipe,
        &RecipeParams {
            args,
            components_dir: components_dir.to_path_buf(),
        },
        |name| std::env::var(name).ok(),
    )?;

    let yaml =
        serde_yaml_ng::to_string(&built).map_err(|e| format!("cannot serialize output: {}", e))?;
    if output == Path::new("-") {
        print!("{}", yaml);
    } else {
        std::fs::write(output, &yaml)
            .map_err(|e| format!("cannot write {}: {}", output.display(), e))?;
        println!("Wrote {}", output.display());
    }
    Ok(())
}

/// Parse repeated `-A NAME=VALUE` overrides into a map.
fn parse_arg_overrides(pairs: &[String]) -> Result<HashMap<String, String>, String> {
    let mut args = HashMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid argument override '{}', expected NAME=VALUE", pair))?;
        args.insert(name.to_string(), value.to_string());
    }
    Ok(args)
}

fn cmd_info(recipe_path: &Path) -> Result<(), String> {
    let recipe = recipe::load_recipe(recipe_path)?;
    print!("{}", info_report(recipe_path, &recipe));
    Ok(())
}

/// Render the `info` output: recipe metadata plus an aligned argument table.
fn info_report(recipe_path: &Path, recipe: &recipe::Recipe) -> String {
    let mut report = format!(
        "\nRecipe path: {}\nDescription: {}\nArguments:\n",
        recipe_path.display(),
        recipe.description.as_deref().unwrap_or("")
    );
    let longest = recipe.args.keys().map(String::len).max().unwrap_or(0);
    for (name, spec) in &recipe.args {
        report.push_str(&format!(
            "  -A{}{}{}",
            name,
            " ".repeat(longest + 3 - name.len()),
            spec.description.as_deref().unwrap_or("")
        ));
        if let Some(env) = spec.env.as_deref() {
            if !env.is_empty() {
                report.push_str(&format!(" (ENV var '{}')", env));
            }
        }
        report.push('\n');
    }
    report
}
