//! Execution identities and their permission grants.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::template::Resource;
use crate::{LogicalId, Result};

pub const POLICY_VERSION: &str = "2012-10-17";

/// Services allowed to assume a role.
pub mod principals {
    pub const CODEBUILD: &str = "codebuild.amazonaws.com";
    pub const CODEPIPELINE: &str = "codepipeline.amazonaws.com";
    pub const CLOUDFORMATION: &str = "cloudformation.amazonaws.com";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "Service")]
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    /// ARN strings or intrinsic functions resolving to ARNs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.into_iter().map(Into::into).collect(),
            resource: Vec::new(),
        }
    }

    pub fn on<I, R>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Value>,
    {
        self.resource = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_all(self) -> Self {
        self.on(["*"])
    }

    /// Trust statement letting `service` assume the role.
    pub fn assume_role(service: &str) -> Self {
        Self {
            effect: Effect::Allow,
            principal: Some(Principal {
                service: service.to_string(),
            }),
            action: vec!["sts:AssumeRole".to_string()],
            resource: Vec::new(),
        }
    }

    pub fn is_wildcard_scoped(&self) -> bool {
        self.resource.iter().any(|r| r == "*")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.statement
            .iter()
            .flat_map(|s| s.action.iter().map(String::as_str))
    }
}

/// An identity assumed by one service, with inline policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub logical_id: LogicalId,
    pub assumed_by: String,
    pub inline_policies: BTreeMap<String, PolicyDocument>,
}

impl Role {
    pub fn new(construct_id: &str, assumed_by: &str) -> Result<Self> {
        Ok(Self {
            logical_id: LogicalId::from_construct_id(construct_id)?,
            assumed_by: assumed_by.to_string(),
            inline_policies: BTreeMap::new(),
        })
    }

    pub fn with_inline_policy(mut self, name: impl Into<String>, document: PolicyDocument) -> Self {
        self.inline_policies.insert(name.into(), document);
        self
    }

    /// Every action granted across all inline policies.
    pub fn granted_actions(&self) -> Vec<&str> {
        self.inline_policies
            .values()
            .flat_map(|doc| doc.actions())
            .collect()
    }

    pub fn to_resource(&self) -> Result<Resource> {
        let trust = PolicyDocument::new(vec![PolicyStatement::assume_role(&self.assumed_by)]);
        let policies = self
            .inline_policies
            .iter()
            .map(|(name, doc)| -> Result<Value> {
                Ok(json!({
                    "PolicyName": name,
                    "PolicyDocument": serde_json::to_value(doc)?,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": serde_json::to_value(&trust)?,
                "Policies": policies,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_resource_shape() {
        let role = Role::new("BuildRole", principals::CODEBUILD)
            .unwrap()
            .with_inline_policy(
                "Policy",
                PolicyDocument::new(vec![PolicyStatement::allow(["ecr:ListImages"]).on_all()]),
            );

        let resource = role.to_resource().unwrap();
        assert_eq!(resource.resource_type, "AWS::IAM::Role");

        let trust = &resource.properties["AssumeRolePolicyDocument"];
        assert_eq!(trust["Version"], POLICY_VERSION);
        assert_eq!(trust["Statement"][0]["Principal"]["Service"], principals::CODEBUILD);
        assert_eq!(trust["Statement"][0]["Action"][0], "sts:AssumeRole");
        assert!(trust["Statement"][0].get("Resource").is_none());

        let policy = &resource.properties["Policies"][0];
        assert_eq!(policy["PolicyName"], "Policy");
        assert_eq!(policy["PolicyDocument"]["Statement"][0]["Effect"], "Allow");
        assert_eq!(policy["PolicyDocument"]["Statement"][0]["Resource"][0], "*");
    }

    #[test]
    fn test_wildcard_detection() {
        let scoped = PolicyStatement::allow(["s3:GetObject*"]).on(["arn:aws:s3:::b/*"]);
        assert!(!scoped.is_wildcard_scoped());
        assert!(PolicyStatement::allow(["iam:GetRole"]).on_all().is_wildcard_scoped());
    }
}
