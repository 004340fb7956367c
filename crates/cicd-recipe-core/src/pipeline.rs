//! Pipeline and stage definitions.
//!
//! The pipeline stack composes three identities, one build project and the
//! Source → Build → Deploy stages into a single pipeline resource. Stage
//! execution belongs to the provider; this module only describes it and
//! checks the description is internally consistent before emitting it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactPath, BucketDescriptor};
use crate::iam::{PolicyDocument, PolicyStatement, Role, principals};
use crate::naming::{self, artifact_bucket, pipeline, secret};
use crate::secret::SecretReference;
use crate::stack::StackDefinition;
use crate::settings::DeployTarget;
use crate::template::{ACCOUNT_ID, Output, Resource, get_att, reference, sub};
use crate::{Error, LogicalId, Result, Settings, Template};

pub const PIPELINE_TYPE: &str = "AWS::CodePipeline::Pipeline";
pub const PROJECT_TYPE: &str = "AWS::CodeBuild::Project";
pub const WEBHOOK_TYPE: &str = "AWS::CodePipeline::Webhook";

/// Capabilities granted to the change-set action.
pub const CHANGE_SET_CAPABILITIES: &[&str] = &["CAPABILITY_NAMED_IAM", "CAPABILITY_AUTO_EXPAND"];

const ECR_ACTIONS: &[&str] = &[
    "ecr:DescribeRepositories",
    "ecr:GetAuthorizationToken",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:GetRepositoryPolicy",
    "ecr:ListImages",
    "ecr:BatchGetImage",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
    "ecr:PutImage",
];

const BUCKET_READ_ACTIONS: &[&str] = &["s3:GetBucket*", "s3:GetObject*", "s3:List*"];

const BUCKET_WRITE_ACTIONS: &[&str] = &["s3:DeleteObject*", "s3:PutObject*", "s3:Abort*"];

const BUILD_LOG_ACTIONS: &[&str] = &[
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

const BUILD_CONTROL_ACTIONS: &[&str] = &[
    "codebuild:BatchGetBuilds",
    "codebuild:StartBuild",
    "codebuild:StopBuild",
];

const CHANGE_SET_ACTIONS: &[&str] = &[
    "cloudformation:CreateChangeSet",
    "cloudformation:DeleteChangeSet",
    "cloudformation:DescribeChangeSet",
    "cloudformation:DescribeStacks",
    "cloudformation:ExecuteChangeSet",
];

const IAM_ROLE_ACTIONS: &[&str] = &[
    "iam:GetRole",
    "iam:CreateRole",
    "iam:TagRole",
    "iam:AttachRolePolicy",
    "iam:PassRole",
];

const FUNCTION_ACTIONS: &[&str] = &[
    "lambda:GetFunction",
    "lambda:GetFunctionUrlConfig",
    "lambda:CreateFunction",
    "lambda:CreateFunctionUrlConfig",
    "lambda:AddPermission",
    "lambda:TagResource",
];

/// Action category, as the provider classifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCategory {
    Source,
    Build,
    Deploy,
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Fetch a branch from a remote repository.
    GitHubSource {
        owner: String,
        repo: String,
        branch: String,
        oauth_token: SecretReference,
    },
    /// Run a build project.
    CodeBuild { project: LogicalId },
    /// Create (or replace) a change set against a target stack.
    CreateReplaceChangeSet {
        stack_name: String,
        change_set_name: String,
        template_path: ArtifactPath,
        template_configuration: Option<ArtifactPath>,
        role: Option<LogicalId>,
    },
    /// Execute a previously created change set.
    ExecuteChangeSet {
        stack_name: String,
        change_set_name: String,
    },
}

impl ActionKind {
    pub fn category(&self) -> ActionCategory {
        match self {
            ActionKind::GitHubSource { .. } => ActionCategory::Source,
            ActionKind::CodeBuild { .. } => ActionCategory::Build,
            ActionKind::CreateReplaceChangeSet { .. } | ActionKind::ExecuteChangeSet { .. } => {
                ActionCategory::Deploy
            }
        }
    }

    fn action_type_id(&self) -> Value {
        let (owner, provider) = match self {
            ActionKind::GitHubSource { .. } => ("ThirdParty", "GitHub"),
            ActionKind::CodeBuild { .. } => ("AWS", "CodeBuild"),
            ActionKind::CreateReplaceChangeSet { .. } | ActionKind::ExecuteChangeSet { .. } => {
                ("AWS", "CloudFormation")
            }
        };
        json!({
            "Category": self.category(),
            "Owner": owner,
            "Provider": provider,
            "Version": "1",
        })
    }

    fn configuration(&self) -> Value {
        match self {
            ActionKind::GitHubSource {
                owner,
                repo,
                branch,
                oauth_token,
            } => json!({
                "Owner": owner,
                "Repo": repo,
                "Branch": branch,
                "OAuthToken": oauth_token.dynamic_reference(),
                "PollForSourceChanges": false,
            }),
            ActionKind::CodeBuild { project } => json!({ "ProjectName": reference(project) }),
            ActionKind::CreateReplaceChangeSet {
                stack_name,
                change_set_name,
                template_path,
                template_configuration,
                role,
            } => {
                let mut config = Map::new();
                config.insert("ActionMode".into(), json!("CHANGE_SET_REPLACE"));
                config.insert("StackName".into(), json!(stack_name));
                config.insert("ChangeSetName".into(), json!(change_set_name));
                config.insert("TemplatePath".into(), json!(template_path.to_string()));
                if let Some(path) = template_configuration {
                    config.insert("TemplateConfiguration".into(), json!(path.to_string()));
                }
                if let Some(role) = role {
                    config.insert("RoleArn".into(), get_att(role, "Arn"));
                    config.insert(
                        "Capabilities".into(),
                        json!(CHANGE_SET_CAPABILITIES.join(",")),
                    );
                }
                Value::Object(config)
            }
            ActionKind::ExecuteChangeSet {
                stack_name,
                change_set_name,
            } => json!({
                "ActionMode": "CHANGE_SET_EXECUTE",
                "StackName": stack_name,
                "ChangeSetName": change_set_name,
            }),
        }
    }
}

/// The smallest unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub run_order: u32,
}

impl Action {
    /// Every artifact this action reads, including files referenced by path.
    fn consumed_artifacts(&self) -> Vec<&Artifact> {
        let mut consumed: Vec<&Artifact> = self.inputs.iter().collect();
        if let ActionKind::CreateReplaceChangeSet {
            template_path,
            template_configuration,
            ..
        } = &self.kind
        {
            consumed.push(&template_path.artifact);
            if let Some(path) = template_configuration {
                consumed.push(&path.artifact);
            }
        }
        consumed
    }

    fn to_json(&self) -> Value {
        let names = |artifacts: &[Artifact]| -> Value {
            artifacts
                .iter()
                .map(|a| json!({ "Name": a.name() }))
                .collect()
        };

        let mut action = Map::new();
        action.insert("Name".into(), json!(self.name));
        action.insert("ActionTypeId".into(), self.kind.action_type_id());
        action.insert("Configuration".into(), self.kind.configuration());
        if !self.inputs.is_empty() {
            action.insert("InputArtifacts".into(), names(&self.inputs));
        }
        if !self.outputs.is_empty() {
            action.insert("OutputArtifacts".into(), names(&self.outputs));
        }
        action.insert("RunOrder".into(), json!(self.run_order));
        Value::Object(action)
    }
}

/// A named step grouping ordered actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// A pipeline and its ordered stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub name: String,
    pub role: LogicalId,
    /// Artifact bucket, referenced by name only.
    pub artifact_bucket: String,
    pub stages: Vec<Stage>,
}

impl PipelineDescriptor {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check structural consistency:
    /// - stage names are unique and stages are non-empty
    /// - run orders strictly increase in declaration order
    /// - every consumed artifact was produced by an earlier action
    /// - no artifact is produced twice
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidInput(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut stage_names = HashSet::new();
        let mut produced: HashSet<&str> = HashSet::new();
        let mut last_run_order = 0u32;

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(Error::Duplicate(format!("stage '{}'", stage.name)));
            }
            if stage.actions.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }

            for action in &stage.actions {
                if action.run_order <= last_run_order {
                    return Err(Error::RunOrder {
                        stage: stage.name.clone(),
                        message: format!(
                            "action '{}' has run order {} but the previous action has {}",
                            action.name, action.run_order, last_run_order
                        ),
                    });
                }
                last_run_order = action.run_order;

                for input in action.consumed_artifacts() {
                    if !produced.contains(input.name()) {
                        return Err(Error::InvalidReference(format!(
                            "action '{}' consumes artifact '{}' before it is produced",
                            action.name,
                            input.name()
                        )));
                    }
                }
                for output in &action.outputs {
                    if !produced.insert(output.name()) {
                        return Err(Error::Duplicate(format!(
                            "artifact '{}'",
                            output.name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Push webhook starting the pipeline from its GitHub source action,
    /// filtered on the configured branch.
    pub fn webhook(&self, pipeline_id: &LogicalId) -> Option<Resource> {
        let (action, oauth_token) = self
            .stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find_map(|a| match &a.kind {
                ActionKind::GitHubSource { oauth_token, .. } => Some((a, oauth_token)),
                _ => None,
            })?;

        Some(Resource::new(
            WEBHOOK_TYPE,
            json!({
                "Authentication": "GITHUB_HMAC",
                "AuthenticationConfiguration": {
                    "SecretToken": oauth_token.dynamic_reference(),
                },
                // CodePipeline substitutes {Branch} from the action configuration.
                "Filters": [{ "JsonPath": "$.ref", "MatchEquals": "refs/heads/{Branch}" }],
                "TargetAction": action.name,
                "TargetPipeline": reference(pipeline_id),
                "TargetPipelineVersion": 1,
                "RegisterWithThirdParty": true,
            }),
        ))
    }

    pub fn to_resource(&self) -> Result<Resource> {
        self.validate()?;

        let stages: Vec<Value> = self
            .stages
            .iter()
            .map(|stage| {
                json!({
                    "Name": stage.name,
                    "Actions": stage.actions.iter().map(Action::to_json).collect::<Vec<_>>(),
                })
            })
            .collect();

        Ok(Resource::new(
            PIPELINE_TYPE,
            json!({
                "Name": self.name,
                "RoleArn": get_att(&self.role, "Arn"),
                "ArtifactStore": { "Type": "S3", "Location": self.artifact_bucket },
                "Stages": stages,
            }),
        ))
    }
}

/// A plaintext variable injected into the build environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: Value,
}

/// A managed build project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProject {
    pub logical_id: LogicalId,
    pub name: String,
    pub role: LogicalId,
    pub image: String,
    /// Required for building container images.
    pub privileged: bool,
    pub environment_variables: Vec<EnvironmentVariable>,
}

impl BuildProject {
    pub fn to_resource(&self) -> Resource {
        let variables: Vec<Value> = self
            .environment_variables
            .iter()
            .map(|v| json!({ "Name": v.name, "Type": "PLAINTEXT", "Value": v.value }))
            .collect();

        Resource::new(
            PROJECT_TYPE,
            json!({
                "Name": self.name,
                "ServiceRole": get_att(&self.role, "Arn"),
                "Source": { "Type": "CODEPIPELINE" },
                "Artifacts": { "Type": "CODEPIPELINE" },
                "Environment": {
                    "Type": "LINUX_CONTAINER",
                    "ComputeType": "BUILD_GENERAL1_SMALL",
                    "Image": self.image,
                    "ImagePullCredentialsType": "CODEBUILD",
                    "PrivilegedMode": self.privileged,
                    "EnvironmentVariables": variables,
                },
            }),
        )
    }
}

/// Declares the delivery pipeline. Depends on the secret and bucket stacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStack;

impl PipelineStack {
    /// Identity for the build project: container-registry read/write, plus
    /// its log group and the artifact bucket.
    pub fn build_role(bucket: &BucketDescriptor) -> Result<Role> {
        let log_group = format!(
            "arn:${{AWS::Partition}}:logs:${{AWS::Region}}:${{AWS::AccountId}}:log-group:/aws/codebuild/{}",
            pipeline::BUILD_PROJECT
        );

        Ok(
            Role::new("LambdaCodePipelineCodeBuildRoleId", principals::CODEBUILD)?
                .with_inline_policy(
                    "CodeBuildRolePolicy",
                    PolicyDocument::new(vec![
                        PolicyStatement::allow(ECR_ACTIONS.iter().copied()).on_all(),
                    ]),
                )
                .with_inline_policy(
                    "CodeBuildDefaultPolicy",
                    PolicyDocument::new(vec![
                        PolicyStatement::allow(BUILD_LOG_ACTIONS.iter().copied())
                            .on([sub(log_group.clone()), sub(format!("{log_group}:*"))]),
                        bucket_read_write(bucket),
                    ]),
                ),
        )
    }

    /// Identity for the pipeline: bucket read, role management and
    /// function lifecycle, plus what running the build and deploy actions
    /// requires.
    pub fn pipeline_role(
        bucket: &BucketDescriptor,
        project: &BuildProject,
        deploy: &DeployTarget,
    ) -> Result<Role> {
        let target_stack = format!(
            "arn:${{AWS::Partition}}:cloudformation:${{AWS::Region}}:${{AWS::AccountId}}:stack/{}/*",
            deploy.stack_name
        );

        Ok(
            Role::new("LambdaCodePipelineRoleId", principals::CODEPIPELINE)?
                .with_inline_policy(
                    "LambdaCodePipelinePolicy",
                    PolicyDocument::new(vec![
                        PolicyStatement::allow(BUCKET_READ_ACTIONS.iter().copied())
                            .on([bucket.objects_arn(), bucket.arn()]),
                        PolicyStatement::allow(IAM_ROLE_ACTIONS.iter().copied()).on_all(),
                        PolicyStatement::allow(FUNCTION_ACTIONS.iter().copied()).on_all(),
                    ]),
                )
                .with_inline_policy(
                    "LambdaCodePipelineDefaultPolicy",
                    PolicyDocument::new(vec![
                        bucket_read_write(bucket),
                        PolicyStatement::allow(BUILD_CONTROL_ACTIONS.iter().copied())
                            .on([get_att(&project.logical_id, "Arn")]),
                        PolicyStatement::allow(CHANGE_SET_ACTIONS.iter().copied())
                            .on([sub(target_stack)]),
                    ]),
                ),
        )
    }

    /// Identity the change-set action deploys with: administrative access.
    pub fn change_set_role() -> Result<Role> {
        Ok(
            Role::new("LambdaCodePipelineChangeSetRoleId", principals::CLOUDFORMATION)?
                .with_inline_policy(
                    "ChangeSetAdminPolicy",
                    PolicyDocument::new(vec![PolicyStatement::allow(["*"]).on_all()]),
                ),
        )
    }

    pub fn build_project(settings: &Settings, role: &Role) -> Result<BuildProject> {
        let account = match &settings.environment.account {
            Some(account) => json!(account),
            None => reference(ACCOUNT_ID),
        };

        Ok(BuildProject {
            logical_id: "Project".parse()?,
            name: pipeline::BUILD_PROJECT.to_string(),
            role: role.logical_id.clone(),
            image: pipeline::BUILD_IMAGE.to_string(),
            privileged: true,
            environment_variables: vec![
                EnvironmentVariable {
                    name: "AWS_ACCOUNT_ID".to_string(),
                    value: account,
                },
                EnvironmentVariable {
                    name: "ARTIFACT_S3_BUCKET_NAME".to_string(),
                    value: json!(artifact_bucket::NAME),
                },
            ],
        })
    }

    /// Wire the three stages.
    pub fn descriptor(
        settings: &Settings,
        pipeline_role: &Role,
        project: &BuildProject,
        change_set_role: &Role,
    ) -> PipelineDescriptor {
        let source_output = Artifact::new(pipeline::SOURCE_ARTIFACT);
        let build_output = Artifact::new(pipeline::BUILD_ARTIFACT);
        let deploy = &settings.deploy;

        let source = Stage::new(
            "Source",
            vec![Action {
                name: "Source".to_string(),
                kind: ActionKind::GitHubSource {
                    owner: settings.source.owner.clone(),
                    repo: settings.source.repo.clone(),
                    branch: settings.source.branch.clone(),
                    oauth_token: SecretReference::new(
                        settings.secret_id.clone(),
                        secret::TOKEN_FIELD,
                    ),
                },
                inputs: vec![],
                outputs: vec![source_output.clone()],
                run_order: 1,
            }],
        );

        let build = Stage::new(
            "Build",
            vec![Action {
                name: "Build".to_string(),
                kind: ActionKind::CodeBuild {
                    project: project.logical_id.clone(),
                },
                inputs: vec![source_output],
                outputs: vec![build_output.clone()],
                run_order: 2,
            }],
        );

        let deploy_stage = Stage::new(
            "Deploy",
            vec![
                Action {
                    name: "CreateChangeSet".to_string(),
                    kind: ActionKind::CreateReplaceChangeSet {
                        stack_name: deploy.stack_name.clone(),
                        change_set_name: deploy.change_set_name.clone(),
                        template_path: build_output.at_path(&deploy.template_file),
                        template_configuration: Some(
                            build_output.at_path(&deploy.configuration_file),
                        ),
                        role: Some(change_set_role.logical_id.clone()),
                    },
                    inputs: vec![build_output],
                    outputs: vec![],
                    run_order: 3,
                },
                Action {
                    name: "ExecuteChangeSet".to_string(),
                    kind: ActionKind::ExecuteChangeSet {
                        stack_name: deploy.stack_name.clone(),
                        change_set_name: deploy.change_set_name.clone(),
                    },
                    inputs: vec![],
                    outputs: vec![],
                    run_order: 4,
                },
            ],
        );

        PipelineDescriptor {
            name: pipeline::NAME.to_string(),
            role: pipeline_role.logical_id.clone(),
            artifact_bucket: BucketDescriptor::artifact_store().name,
            stages: vec![source, build, deploy_stage],
        }
    }
}

fn bucket_read_write(bucket: &BucketDescriptor) -> PolicyStatement {
    PolicyStatement::allow(
        BUCKET_READ_ACTIONS
            .iter()
            .chain(BUCKET_WRITE_ACTIONS)
            .copied(),
    )
    .on([bucket.arn(), bucket.objects_arn()])
}

impl StackDefinition for PipelineStack {
    fn name(&self) -> &'static str {
        pipeline::STACK
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[naming::secret::STACK, naming::artifact_bucket::STACK]
    }

    fn synthesize(&self, settings: &Settings) -> Result<Template> {
        let bucket = BucketDescriptor::artifact_store();
        let build_role = Self::build_role(&bucket)?;
        let project = Self::build_project(settings, &build_role)?;
        let pipeline_role = Self::pipeline_role(&bucket, &project, &settings.deploy)?;
        let change_set_role = Self::change_set_role()?;
        let descriptor = Self::descriptor(settings, &pipeline_role, &project, &change_set_role);

        info!(
            pipeline = %descriptor.name,
            stages = ?descriptor.stage_names(),
            source = %format!("{}/{}@{}", settings.source.owner, settings.source.repo, settings.source.branch),
            target_stack = %settings.deploy.stack_name,
            "Wiring pipeline"
        );

        let mut template = Template::new("Delivery pipeline: Source, Build, Deploy");
        for role in [&build_role, &pipeline_role, &change_set_role] {
            debug!(
                role = %role.logical_id,
                assumed_by = %role.assumed_by,
                actions = role.granted_actions().len(),
                "Declaring role"
            );
            template.add_resource(role.logical_id.clone(), role.to_resource()?)?;
        }
        template.add_resource(project.logical_id.clone(), project.to_resource())?;

        let pipeline_id = LogicalId::from_construct_id("LambdaCodePipelineId")?;
        template.add_output(
            "PipelineName".parse()?,
            Output::new(reference(&pipeline_id), "Name of the delivery pipeline"),
        )?;
        if let Some(webhook) = descriptor.webhook(&pipeline_id) {
            let webhook_id = LogicalId::from_construct_id("LambdaCodePipelineWebhook")?;
            template.add_resource(webhook_id, webhook)?;
        }
        template.add_resource(pipeline_id, descriptor.to_resource()?)?;
        Ok(template)
    }
}
