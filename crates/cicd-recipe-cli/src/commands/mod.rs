//! CLI command implementations.

pub mod diff;
pub mod list;
pub mod synth;

use anyhow::{Context, Result};
use cicd_recipe_config::{DEFAULT_CONFIG_FILE, SettingsLoader};
use cicd_recipe_core::{App, Settings};
use std::path::Path;
use tracing::debug;

/// Load settings from the given file, or `./recipe.kdl` when it exists.
pub fn load_settings(config: Option<&str>, context: &[String]) -> Result<Settings> {
    let mut loader = SettingsLoader::new()
        .with_assignments(context)
        .context("Invalid --context value")?;

    match config {
        Some(path) => loader = loader.with_file(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!(path = DEFAULT_CONFIG_FILE, "Using default config file");
            loader = loader.with_file(DEFAULT_CONFIG_FILE);
        }
        None => {}
    }

    let source = config.unwrap_or(DEFAULT_CONFIG_FILE);
    loader
        .load()
        .with_context(|| format!("Failed to load configuration ({})", source))
}

pub fn validate(path: Option<&str>, context: &[String]) -> Result<()> {
    let settings = load_settings(path, context)?;
    let stacks = App::recipe()
        .synthesize(&settings, &[])
        .context("Stack definitions are invalid")?;

    println!("Configuration is valid ({} stacks)", stacks.len());
    Ok(())
}
