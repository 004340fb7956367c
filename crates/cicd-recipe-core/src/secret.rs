//! The secret stack and references to stored secret fields.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::naming::{context, secret};
use crate::stack::StackDefinition;
use crate::template::{Output, Resource, reference};
use crate::{Error, LogicalId, Result, Settings, Template};

pub const SECRET_TYPE: &str = "AWS::SecretsManager::Secret";

/// Key-value fields stored as one JSON `SecretString`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(BTreeMap<String, String>);

impl SecretValue {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Render as the provider's `SecretString`.
    pub fn to_secret_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// A named secret entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDescriptor {
    pub name: String,
    pub value: SecretValue,
}

impl SecretDescriptor {
    pub fn logical_id(&self) -> Result<LogicalId> {
        LogicalId::from_construct_id(&format!("{}Id", self.name))
    }

    pub fn to_resource(&self) -> Result<Resource> {
        Ok(Resource::new(
            SECRET_TYPE,
            json!({
                "Name": self.name,
                "SecretString": self.value.to_secret_string()?,
            }),
        ))
    }
}

/// A field of a stored secret, resolved by the provider at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    /// Secret name or ARN.
    pub secret_id: String,
    pub json_field: String,
}

impl SecretReference {
    pub fn new(secret_id: impl Into<String>, json_field: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            json_field: json_field.into(),
        }
    }

    /// `{{resolve:secretsmanager:<id>:SecretString:<field>}}`
    pub fn dynamic_reference(&self) -> String {
        format!(
            "{{{{resolve:secretsmanager:{}:SecretString:{}}}}}",
            self.secret_id, self.json_field
        )
    }
}

/// Declares the secret holding the version-control token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretsManagerStack;

impl SecretsManagerStack {
    /// Resolve the token to embed, honoring `allow_unresolved_token`.
    pub fn token_value(settings: &Settings) -> Result<String> {
        match settings.github_oauth_token.as_deref() {
            Some(token) => Ok(token.to_string()),
            None if settings.allow_unresolved_token => {
                warn!(
                    parameter = context::GITHUB_OAUTH_TOKEN,
                    placeholder = secret::UNRESOLVED_TOKEN,
                    "Token not supplied, embedding placeholder"
                );
                Ok(secret::UNRESOLVED_TOKEN.to_string())
            }
            None => Err(Error::MissingParameter(
                context::GITHUB_OAUTH_TOKEN.to_string(),
            )),
        }
    }

    pub fn descriptor(settings: &Settings) -> Result<SecretDescriptor> {
        let token = Self::token_value(settings)?;
        Ok(SecretDescriptor {
            name: secret::NAME.to_string(),
            value: SecretValue::default().with_field(secret::TOKEN_FIELD, token),
        })
    }
}

impl StackDefinition for SecretsManagerStack {
    fn name(&self) -> &'static str {
        secret::STACK
    }

    fn synthesize(&self, settings: &Settings) -> Result<Template> {
        let descriptor = Self::descriptor(settings)?;
        let id = descriptor.logical_id()?;
        debug!(secret = %descriptor.name, logical_id = %id, "Declaring secret");

        let mut template = Template::new("Secret holding the source repository token");
        template.add_output(
            "SecretArn".parse()?,
            Output::new(reference(&id), "ARN of the token secret"),
        )?;
        template.add_resource(id, descriptor.to_resource()?)?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_token(token: &str) -> Settings {
        Settings {
            github_oauth_token: Some(token.to_string()),
            ..Settings::default()
        }
    }

    fn secret_fields(template: &Template) -> serde_json::Map<String, serde_json::Value> {
        let (_, resource) = template.resources_of_type(SECRET_TYPE).next().unwrap();
        let raw = resource.property("SecretString").unwrap().as_str().unwrap();
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_token_is_embedded_verbatim() {
        let template = SecretsManagerStack
            .synthesize(&settings_with_token("tok-123"))
            .unwrap();

        assert_eq!(template.resources_of_type(SECRET_TYPE).count(), 1);
        let fields = secret_fields(&template);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[secret::TOKEN_FIELD], "tok-123");

        let (id, resource) = template.resources_of_type(SECRET_TYPE).next().unwrap();
        assert_eq!(id.as_str(), "AwsCicdRecipeId");
        assert_eq!(resource.property("Name").unwrap(), secret::NAME);
    }

    #[test]
    fn test_token_with_special_characters_is_not_transformed() {
        let token = "ghp_\"quoted\"\\slash/and unicode ✓";
        let template = SecretsManagerStack
            .synthesize(&settings_with_token(token))
            .unwrap();
        assert_eq!(secret_fields(&template)[secret::TOKEN_FIELD], token);
    }

    #[test]
    fn test_missing_token_fails_by_default() {
        let result = SecretsManagerStack.synthesize(&Settings::default());
        assert!(matches!(
            result,
            Err(Error::MissingParameter(ref p)) if p == context::GITHUB_OAUTH_TOKEN
        ));
    }

    #[test]
    fn test_missing_token_placeholder_when_allowed() {
        let settings = Settings {
            allow_unresolved_token: true,
            ..Settings::default()
        };
        let template = SecretsManagerStack.synthesize(&settings).unwrap();
        assert_eq!(
            secret_fields(&template)[secret::TOKEN_FIELD],
            secret::UNRESOLVED_TOKEN
        );
    }

    #[test]
    fn test_dynamic_reference() {
        let reference = SecretReference::new("AwsCicdRecipe", "GITHUB_OAUTH_TOKEN");
        assert_eq!(
            reference.dynamic_reference(),
            "{{resolve:secretsmanager:AwsCicdRecipe:SecretString:GITHUB_OAUTH_TOKEN}}"
        );
    }

    #[test]
    fn test_secret_string_is_sorted_json() {
        let value = SecretValue::default()
            .with_field("b", "2")
            .with_field("a", "1");
        assert_eq!(value.to_secret_string().unwrap(), r#"{"a":"1","b":"2"}"#);
    }
}
