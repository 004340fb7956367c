//! Context values and variable interpolation.
//!
//! Supports variables like:
//! - `${env.NAME}` - Process environment variable
//! - `${context.KEY}` - Another context value (not itself interpolated)
//!
//! Unknown variables are left in place so callers can report them.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

/// Environment variables with this prefix become context values.
pub const ENV_PREFIX: &str = "RECIPE_CONTEXT_";

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Values available for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Process environment
    pub env: HashMap<String, String>,
    /// Merged context values
    pub context: BTreeMap<String, String>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["env", name] => self.env.get(*name).cloned(),
            ["context", key] => self.context.get(*key).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Variables in `input` that do not resolve.
    pub fn find_unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }

    /// Interpolate `value`, failing if any variable is left unresolved.
    pub fn expand(&self, field: &str, value: &str) -> ConfigResult<String> {
        let unresolved = self.find_unresolved(value);
        if !unresolved.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("unresolved variables: {}", unresolved.join(", ")),
            });
        }
        Ok(self.interpolate(value))
    }
}

/// Builder for creating VariableContext.
#[derive(Default)]
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: &HashMap<String, String>) -> Self {
        self.ctx.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.context.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

/// Context values carried by `RECIPE_CONTEXT_*` environment variables.
pub fn context_from_env(env: &HashMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(ENV_PREFIX)
                .filter(|key| !key.is_empty())
                .map(|key| (key.to_string(), v.clone()))
        })
        .collect()
}

/// Parse a `KEY=VALUE` assignment. The value may itself contain `=`.
pub fn parse_assignment(assignment: &str) -> ConfigResult<(String, String)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidValue {
            field: "context".to_string(),
            message: format!("expected KEY=VALUE, got '{assignment}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_and_context_interpolation() {
        let ctx = VariableContextBuilder::new()
            .with_env("TOKEN", "abc")
            .with_context("SECRET_ID", "AwsCicdRecipe")
            .build();

        let result = ctx.interpolate("${env.TOKEN} for ${context.SECRET_ID}");
        assert_eq!(result, "abc for AwsCicdRecipe");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        assert_eq!(ctx.interpolate("x ${env.NOPE}"), "x ${env.NOPE}");
        assert_eq!(ctx.find_unresolved("x ${env.NOPE} ${git.sha}"), vec!["env.NOPE", "git.sha"]);
    }

    #[test]
    fn test_expand_rejects_unresolved() {
        let ctx = VariableContext::new();
        let result = ctx.expand("GITHUB_OAUTH_TOKEN", "${env.GITHUB_OAUTH_TOKEN}");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "GITHUB_OAUTH_TOKEN"
        ));
    }

    #[test]
    fn test_literal_values_untouched() {
        let ctx = VariableContext::new();
        assert_eq!(ctx.expand("k", "plain $value {x}").unwrap(), "plain $value {x}");
    }

    #[test]
    fn test_context_from_env() {
        let mut env = HashMap::new();
        env.insert("RECIPE_CONTEXT_SECRET_ID".to_string(), "from-env".to_string());
        env.insert("RECIPE_CONTEXT_".to_string(), "ignored".to_string());
        env.insert("PATH".to_string(), "/bin".to_string());

        let ctx = context_from_env(&env);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx["SECRET_ID"], "from-env");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("GITHUB_OAUTH_TOKEN=a=b").unwrap(),
            ("GITHUB_OAUTH_TOKEN".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_assignment("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_assignment("NOEQUALS").is_err());
        assert!(parse_assignment("=value").is_err());
    }
}
