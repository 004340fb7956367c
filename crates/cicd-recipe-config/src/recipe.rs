//! Recipe file parsing.
//!
//! ```kdl
//! app "aws-cicd-recipe"
//! env account="123456789012" region="ap-northeast-1"
//! context {
//!     SECRET_ID "AwsCicdRecipe"
//!     GITHUB_OAUTH_TOKEN "${env.GITHUB_OAUTH_TOKEN}"
//! }
//! source owner="Tomoaki-Moriya" repo="html-to-pdf-lambda" branch="main"
//! deploy stack="HtmlToPdfLambdaStack" template="build.yaml" configuration="param.json"
//! allow-unresolved-token #false
//! tag "project" "cicd-recipe"
//! ```
//!
//! Every node is optional. Values are kept raw here; interpolation and
//! validation happen in the loader.

use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use tracing::warn;

use crate::{ConfigError, ConfigResult};

/// Raw contents of a recipe file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFile {
    pub app: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
    pub context: BTreeMap<String, String>,
    pub source: SourceOverrides,
    pub deploy: DeployOverrides,
    pub allow_unresolved_token: Option<bool>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceOverrides {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOverrides {
    pub stack: Option<String>,
    pub change_set: Option<String>,
    pub template: Option<String>,
    pub configuration: Option<String>,
}

/// Parse a recipe file from KDL text.
pub fn parse_recipe(kdl: &str) -> ConfigResult<RecipeFile> {
    let doc: KdlDocument = kdl.parse()?;
    let mut recipe = RecipeFile::default();
    let mut seen: Vec<&str> = Vec::new();

    for node in doc.nodes() {
        let name = node.name().value();
        if matches!(
            name,
            "app" | "env" | "source" | "deploy" | "allow-unresolved-token"
        ) {
            if seen.contains(&name) {
                return Err(ConfigError::Duplicate(format!("'{name}' node")));
            }
            seen.push(name);
        }

        match name {
            "app" => {
                recipe.app = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("app name".to_string()))?,
                );
            }
            "env" => {
                recipe.account = string_prop(node, "account")?;
                recipe.region = string_prop(node, "region")?;
            }
            "context" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        let key = child.name().value().to_string();
                        let value = get_first_string_arg(child).ok_or_else(|| {
                            ConfigError::InvalidValue {
                                field: format!("context.{key}"),
                                message: "expected a string value".to_string(),
                            }
                        })?;
                        if recipe.context.insert(key.clone(), value).is_some() {
                            return Err(ConfigError::Duplicate(format!("context key '{key}'")));
                        }
                    }
                }
            }
            "source" => {
                recipe.source = SourceOverrides {
                    owner: string_prop(node, "owner")?,
                    repo: string_prop(node, "repo")?,
                    branch: string_prop(node, "branch")?,
                };
            }
            "deploy" => {
                recipe.deploy = DeployOverrides {
                    stack: string_prop(node, "stack")?,
                    change_set: string_prop(node, "change-set")?,
                    template: string_prop(node, "template")?,
                    configuration: string_prop(node, "configuration")?,
                };
            }
            "allow-unresolved-token" => {
                let value = node
                    .entries()
                    .iter()
                    .find(|e| e.name().is_none())
                    .and_then(|e| e.value().as_bool())
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "allow-unresolved-token".to_string(),
                        message: "expected #true or #false".to_string(),
                    })?;
                recipe.allow_unresolved_token = Some(value);
            }
            "tag" => {
                let args = get_all_string_args(node);
                let [key, value] = args.as_slice() else {
                    return Err(ConfigError::InvalidValue {
                        field: "tag".to_string(),
                        message: "expected a key and a value".to_string(),
                    });
                };
                if recipe.tags.insert(key.clone(), value.clone()).is_some() {
                    return Err(ConfigError::Duplicate(format!("tag '{key}'")));
                }
            }
            other => {
                warn!(node = other, "Ignoring unknown configuration node");
            }
        }
    }

    Ok(recipe)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// A string property; present but non-string is an error.
fn string_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<String>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{}.{}", node.name().value(), name),
                message: "expected a string".to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_recipe() {
        let kdl = r#"
            app "my-recipe"
            env account="123456789012" region="ap-northeast-1"
            context {
                SECRET_ID "AwsCicdRecipe"
                GITHUB_OAUTH_TOKEN "${env.GITHUB_OAUTH_TOKEN}"
            }
            source owner="someone" repo="service" branch="release"
            deploy stack="ServiceStack" template="out.yaml" configuration="cfg.json"
            allow-unresolved-token #true
            tag "team" "platform"
        "#;

        let recipe = parse_recipe(kdl).unwrap();
        assert_eq!(recipe.app.as_deref(), Some("my-recipe"));
        assert_eq!(recipe.account.as_deref(), Some("123456789012"));
        assert_eq!(recipe.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(recipe.context["GITHUB_OAUTH_TOKEN"], "${env.GITHUB_OAUTH_TOKEN}");
        assert_eq!(recipe.source.branch.as_deref(), Some("release"));
        assert_eq!(recipe.deploy.stack.as_deref(), Some("ServiceStack"));
        assert_eq!(recipe.deploy.change_set, None);
        assert_eq!(recipe.allow_unresolved_token, Some(true));
        assert_eq!(recipe.tags["team"], "platform");
    }

    #[test]
    fn test_empty_recipe() {
        assert_eq!(parse_recipe("").unwrap(), RecipeFile::default());
    }

    #[test]
    fn test_unknown_nodes_ignored() {
        let recipe = parse_recipe(r#"frobnicate "x""#).unwrap();
        assert_eq!(recipe, RecipeFile::default());
    }

    #[test]
    fn test_duplicate_singleton_rejected() {
        let kdl = r#"
            app "a"
            app "b"
        "#;
        assert!(matches!(parse_recipe(kdl), Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_duplicate_context_key_rejected() {
        let kdl = r#"
            context {
                SECRET_ID "a"
                SECRET_ID "b"
            }
        "#;
        assert!(matches!(parse_recipe(kdl), Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_non_string_property_rejected() {
        let result = parse_recipe("env account=123456789012");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "env.account"
        ));
    }

    #[test]
    fn test_malformed_tag_rejected() {
        assert!(matches!(
            parse_recipe(r#"tag "only-key""#),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse_recipe("app {"), Err(ConfigError::Parse(_))));
    }
}
