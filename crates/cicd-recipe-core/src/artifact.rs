//! Artifact storage: the bucket stack and the handles routed between
//! pipeline actions.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::naming::artifact_bucket;
use crate::stack::StackDefinition;
use crate::template::{Output, RemovalPolicy, Resource, reference};
use crate::{LogicalId, Result, Settings, Template};

pub const BUCKET_TYPE: &str = "AWS::S3::Bucket";

/// A durable object-storage bucket, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDescriptor {
    pub name: String,
    pub removal_policy: RemovalPolicy,
}

impl BucketDescriptor {
    /// The shared artifact store every stack refers to.
    pub fn artifact_store() -> Self {
        Self {
            name: artifact_bucket::NAME.to_string(),
            removal_policy: RemovalPolicy::Destroy,
        }
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name)
    }

    /// ARN pattern matching every object in the bucket.
    pub fn objects_arn(&self) -> String {
        format!("{}/*", self.arn())
    }

    pub fn logical_id(&self) -> Result<LogicalId> {
        LogicalId::from_construct_id(&format!("{}-id", self.name))
    }

    pub fn to_resource(&self) -> Resource {
        Resource::new(BUCKET_TYPE, json!({ "BucketName": self.name }))
            .with_removal_policy(self.removal_policy)
    }
}

/// Declares the artifact bucket. Takes no inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactBucketStack;

impl StackDefinition for ArtifactBucketStack {
    fn name(&self) -> &'static str {
        artifact_bucket::STACK
    }

    fn synthesize(&self, _settings: &Settings) -> Result<Template> {
        let bucket = BucketDescriptor::artifact_store();
        let id = bucket.logical_id()?;
        debug!(bucket = %bucket.name, logical_id = %id, "Declaring artifact bucket");

        let mut template = Template::new("Artifact store for the delivery pipeline");
        template.add_output(
            "BucketName".parse()?,
            Output::new(reference(&id), "Name of the artifact bucket"),
        )?;
        template.add_output(
            "BucketArn".parse()?,
            Output::new(json!(bucket.arn()), "ARN of the artifact bucket"),
        )?;
        template.add_resource(id, bucket.to_resource())?;
        Ok(template)
    }
}

/// Opaque handle to data passed from one pipeline action to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    name: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A file inside this artifact.
    pub fn at_path(&self, file: impl Into<String>) -> ArtifactPath {
        ArtifactPath {
            artifact: self.clone(),
            file: file.into(),
        }
    }
}

/// A file path inside an artifact, rendered as `artifact::file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPath {
    pub artifact: Artifact,
    pub file: String,
}

impl std::fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.artifact.name, self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_destroyable_bucket() {
        let template = ArtifactBucketStack.synthesize(&Settings::default()).unwrap();

        let buckets: Vec<_> = template.resources_of_type(BUCKET_TYPE).collect();
        assert_eq!(buckets.len(), 1);
        assert_eq!(template.resources.len(), 1);

        let (_, bucket) = buckets[0];
        assert_eq!(bucket.property("BucketName").unwrap(), artifact_bucket::NAME);
        assert_eq!(bucket.deletion_policy, Some(RemovalPolicy::Destroy));
        assert_eq!(bucket.update_replace_policy, Some(RemovalPolicy::Destroy));
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let settings = Settings::default();
        let first = ArtifactBucketStack.synthesize(&settings).unwrap();
        let second = ArtifactBucketStack.synthesize(&settings).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    }

    #[test]
    fn test_outputs_reference_bucket() {
        let template = ArtifactBucketStack.synthesize(&Settings::default()).unwrap();
        let name = &template.outputs[&"BucketName".parse::<LogicalId>().unwrap()];
        assert_eq!(name.value, json!({ "Ref": "awscicdrecipeartifactbucketid" }));
    }

    #[test]
    fn test_bucket_arns() {
        let bucket = BucketDescriptor::artifact_store();
        assert_eq!(bucket.arn(), "arn:aws:s3:::aws-ci-cd-recipe-artifact-bucket");
        assert_eq!(bucket.objects_arn(), "arn:aws:s3:::aws-ci-cd-recipe-artifact-bucket/*");
    }

    #[test]
    fn test_artifact_path_display() {
        let build = Artifact::new("build");
        assert_eq!(build.at_path("build.yaml").to_string(), "build::build.yaml");
    }
}
