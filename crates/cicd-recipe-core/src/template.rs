//! CloudFormation-compatible template documents.
//!
//! Every map in a template is ordered so two syntheses of the same input
//! serialize to identical bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{Error, LogicalId, Result};

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Pseudo parameter resolving to the deploying account.
pub const ACCOUNT_ID: &str = "AWS::AccountId";

/// A synthesized stack description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub resources: BTreeMap<LogicalId, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: Some(description.into()),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource, rejecting a logical ID that is already taken.
    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&id) {
            return Err(Error::Duplicate(format!("resource '{id}'")));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, id: LogicalId, output: Output) -> Result<()> {
        if self.outputs.contains_key(&id) {
            return Err(Error::Duplicate(format!("output '{id}'")));
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    /// All resources of the given type, in logical ID order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hex SHA-256 of the pretty-printed template.
    pub fn digest(&self) -> Result<String> {
        let body = self.to_json_pretty()?;
        Ok(hex::encode(Sha256::digest(body.as_bytes())))
    }
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    /// Apply the policy to both deletion and replacement.
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// What happens to a resource when its stack is deleted or the resource replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[serde(rename = "Delete")]
    Destroy,
    Retain,
    Snapshot,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
            RemovalPolicy::Snapshot => write!(f, "snapshot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    pub fn new(value: Value, description: impl Into<String>) -> Self {
        Self {
            value,
            description: Some(description.into()),
        }
    }
}

/// `{"Ref": id}`
pub fn reference(id: impl AsRef<str>) -> Value {
    json!({ "Ref": id.as_ref() })
}

/// `{"Fn::GetAtt": [id, attribute]}`
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

/// `{"Fn::Sub": pattern}`
pub fn sub(pattern: impl Into<String>) -> Value {
    json!({ "Fn::Sub": pattern.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> Resource {
        Resource::new("AWS::S3::Bucket", json!({ "BucketName": "b" }))
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut template = Template::new("test");
        let id: LogicalId = "Bucket".parse().unwrap();
        template.add_resource(id.clone(), bucket()).unwrap();

        let result = template.add_resource(id, bucket());
        assert!(matches!(result, Err(Error::Duplicate(_))));
    }

    #[test]
    fn test_serialized_shape() {
        let mut template = Template::new("test");
        template
            .add_resource(
                "Bucket".parse().unwrap(),
                bucket().with_removal_policy(RemovalPolicy::Destroy),
            )
            .unwrap();

        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], FORMAT_VERSION);
        assert_eq!(value["Resources"]["Bucket"]["Type"], "AWS::S3::Bucket");
        assert_eq!(value["Resources"]["Bucket"]["DeletionPolicy"], "Delete");
        assert_eq!(value["Resources"]["Bucket"]["UpdateReplacePolicy"], "Delete");
        assert!(value.get("Outputs").is_none());
    }

    #[test]
    fn test_digest_is_stable() {
        let mut a = Template::new("test");
        a.add_resource("Bucket".parse().unwrap(), bucket()).unwrap();
        let b = a.clone();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }

    #[test]
    fn test_intrinsics() {
        assert_eq!(reference(ACCOUNT_ID), json!({ "Ref": "AWS::AccountId" }));
        let id: LogicalId = "Role".parse().unwrap();
        assert_eq!(get_att(&id, "Arn"), json!({ "Fn::GetAtt": ["Role", "Arn"] }));
    }
}
