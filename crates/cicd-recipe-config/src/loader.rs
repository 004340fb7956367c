//! Resolve the recipe file and context layers into `Settings`.
//!
//! Context precedence, lowest to highest:
//! 1. `context { }` in the recipe file
//! 2. `RECIPE_CONTEXT_*` environment variables
//! 3. explicit assignments (`--context KEY=VALUE`)

use cicd_recipe_core::Settings;
use cicd_recipe_core::naming::{self, context as keys};
use cicd_recipe_core::settings::{DeployTarget, Environment, SourceRepository};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::context::{VariableContext, VariableContextBuilder, context_from_env, parse_assignment};
use crate::recipe::{RecipeFile, parse_recipe};
use crate::{ConfigError, ConfigResult};

pub const DEFAULT_CONFIG_FILE: &str = "recipe.kdl";

static ACCOUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{12}$").unwrap());
static REGION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").unwrap());

/// Builds validated settings from a recipe file, the environment and
/// explicit context assignments.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env: HashMap<String, String>,
    assignments: BTreeMap<String, String>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// A loader reading the current process environment.
    pub fn new() -> Self {
        Self {
            file: None,
            env: std::env::vars().collect(),
            assignments: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment the loader reads from.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.insert(key.into(), value.into());
        self
    }

    /// Add `KEY=VALUE` assignments; later ones win.
    pub fn with_assignments<S: AsRef<str>>(mut self, assignments: &[S]) -> ConfigResult<Self> {
        for assignment in assignments {
            let (key, value) = parse_assignment(assignment.as_ref())?;
            self.assignments.insert(key, value);
        }
        Ok(self)
    }

    /// Read the configured file (if any) and resolve settings.
    pub fn load(&self) -> ConfigResult<Settings> {
        let recipe = match &self.file {
            Some(path) => {
                debug!(path = %path.display(), "Reading recipe file");
                let content = std::fs::read_to_string(path)?;
                parse_recipe(&content)?
            }
            None => RecipeFile::default(),
        };
        self.resolve(recipe)
    }

    /// Resolve settings from recipe text instead of a file.
    pub fn load_str(&self, kdl: &str) -> ConfigResult<Settings> {
        self.resolve(parse_recipe(kdl)?)
    }

    fn resolve(&self, recipe: RecipeFile) -> ConfigResult<Settings> {
        let mut raw = recipe.context.clone();
        raw.extend(context_from_env(&self.env));
        raw.extend(self.assignments.clone());

        for key in raw.keys() {
            if !keys::KNOWN_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "Unknown context key");
            }
        }

        let vars = raw
            .iter()
            .fold(
                VariableContextBuilder::new().with_envs(&self.env),
                |builder, (k, v)| builder.with_context(k.clone(), v.clone()),
            )
            .build();

        let mut context = BTreeMap::new();
        for (key, value) in &raw {
            match vars.expand(key, value) {
                Ok(expanded) => {
                    context.insert(key.clone(), expanded);
                }
                // The secret stack decides what a missing token means.
                Err(err) if key == keys::GITHUB_OAUTH_TOKEN => {
                    debug!(error = %err, "Unresolved token treated as absent");
                }
                Err(err) => return Err(err),
            }
        }

        let secret_id = match context.get(keys::SECRET_ID) {
            Some(id) if id.trim().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    field: keys::SECRET_ID.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            Some(id) => id.clone(),
            None => naming::secret::NAME.to_string(),
        };

        let github_oauth_token = match context.get(keys::GITHUB_OAUTH_TOKEN) {
            Some(token) if token.is_empty() => {
                debug!("Empty token treated as absent");
                None
            }
            Some(token) => Some(token.clone()),
            None => None,
        };

        let environment = Environment {
            account: expand_opt(&vars, "env.account", recipe.account.as_deref())?,
            region: expand_opt(&vars, "env.region", recipe.region.as_deref())?,
        };
        validate_environment(&environment)?;

        let source = resolve_source(&vars, &recipe)?;
        let deploy = resolve_deploy(&vars, &recipe)?;

        let mut tags = BTreeMap::new();
        for (key, value) in &recipe.tags {
            tags.insert(key.clone(), vars.expand(&format!("tag.{key}"), value)?);
        }

        let settings = Settings {
            app: expand_opt(&vars, "app", recipe.app.as_deref())?
                .unwrap_or_else(|| naming::app::NAME.to_string()),
            environment,
            secret_id,
            github_oauth_token,
            allow_unresolved_token: recipe.allow_unresolved_token.unwrap_or(false),
            source,
            deploy,
            tags,
        };

        info!(
            app = %settings.app,
            environment = %settings.environment.uri(),
            secret_id = %settings.secret_id,
            token_supplied = settings.github_oauth_token.is_some(),
            "Loaded settings"
        );
        Ok(settings)
    }
}

fn expand_opt(
    vars: &VariableContext,
    field: &str,
    value: Option<&str>,
) -> ConfigResult<Option<String>> {
    value.map(|v| vars.expand(field, v)).transpose()
}

/// Expand an override or fall back to `default`; the result must be non-empty.
fn expand_or(
    vars: &VariableContext,
    field: &str,
    value: Option<&str>,
    default: &str,
) -> ConfigResult<String> {
    let resolved = expand_opt(vars, field, value)?.unwrap_or_else(|| default.to_string());
    if resolved.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(resolved)
}

fn validate_environment(env: &Environment) -> ConfigResult<()> {
    if let Some(account) = &env.account {
        if !ACCOUNT_REGEX.is_match(account) {
            return Err(ConfigError::InvalidValue {
                field: "env.account".to_string(),
                message: format!("'{account}' is not a 12-digit account id"),
            });
        }
    }
    if let Some(region) = &env.region {
        if !REGION_REGEX.is_match(region) {
            return Err(ConfigError::InvalidValue {
                field: "env.region".to_string(),
                message: format!("'{region}' is not a region name"),
            });
        }
    }
    Ok(())
}

fn resolve_source(vars: &VariableContext, recipe: &RecipeFile) -> ConfigResult<SourceRepository> {
    let overrides = &recipe.source;
    Ok(SourceRepository {
        owner: expand_or(vars, "source.owner", overrides.owner.as_deref(), naming::source::OWNER)?,
        repo: expand_or(vars, "source.repo", overrides.repo.as_deref(), naming::source::REPO)?,
        branch: expand_or(
            vars,
            "source.branch",
            overrides.branch.as_deref(),
            naming::source::BRANCH,
        )?,
    })
}

fn resolve_deploy(vars: &VariableContext, recipe: &RecipeFile) -> ConfigResult<DeployTarget> {
    let overrides = &recipe.deploy;
    let stack_name = expand_or(
        vars,
        "deploy.stack",
        overrides.stack.as_deref(),
        naming::deploy::TARGET_STACK,
    )?;
    // A renamed target stack gets a change set named after it.
    let default_change_set = format!("{stack_name}ChangeSet");

    Ok(DeployTarget {
        change_set_name: expand_or(
            vars,
            "deploy.change-set",
            overrides.change_set.as_deref(),
            &default_change_set,
        )?,
        stack_name,
        template_file: expand_or(
            vars,
            "deploy.template",
            overrides.template.as_deref(),
            naming::deploy::TEMPLATE_FILE,
        )?,
        configuration_file: expand_or(
            vars,
            "deploy.configuration",
            overrides.configuration.as_deref(),
            naming::deploy::CONFIGURATION_FILE,
        )?,
    })
}
