//! Configuration loading for the CI/CD recipe.
//!
//! This crate handles:
//! - Parsing the optional `recipe.kdl` file
//! - Layering context values from the file, environment and CLI
//! - Variable interpolation inside configured values
//! - Resolving everything into a validated `Settings`

pub mod context;
pub mod error;
pub mod loader;
pub mod recipe;

pub use context::{VariableContext, VariableContextBuilder};
pub use error::{ConfigError, ConfigResult};
pub use loader::{DEFAULT_CONFIG_FILE, SettingsLoader};
pub use recipe::{RecipeFile, parse_recipe};
